//! Runs scripts one after the other, keeping the context alive between them when possible.

use std::error::Error as StdError;
use std::fmt;
use std::path::Path;
use std::rc::Rc;

use image::{ImageFormat, Rgba, RgbaImage};
use log::{debug, info};

use crate::backend::BackendFactory;
use crate::config::Config;
use crate::context::{self, Context, ContextRequest};
use crate::fbo::{Framebuffer, IncompleteFramebuffer};
use crate::program::{Program, ProgramCreationError};
use crate::requirements::Unmet;
use crate::result::TestResult;
use crate::script::{LoadError, Script};
use crate::source::Source;
use crate::tester::{self, ProgramState};

#[derive(Debug)]
pub enum Error {
    LoadError(LoadError),
    /// The backend couldn't create a context for the request.
    Backend(ContextRequest, Box<dyn StdError>),
    Context(context::CreationError),
    Unmet(Unmet),
    Framebuffer(IncompleteFramebuffer),
    Program(ProgramCreationError),
    TestError(tester::Error),
    Image(image::ImageError),
}

impl Error {
    pub fn result(&self) -> TestResult {
        match self {
            Error::Backend(..) | Error::Unmet(_) => TestResult::Skip,
            Error::LoadError(_) |
            Error::Context(_) |
            Error::Framebuffer(_) |
            Error::Program(_) |
            Error::TestError(_) |
            Error::Image(_) => TestResult::Fail,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::LoadError(e) => e.fmt(f),
            Error::Backend(request, e) => {
                write!(f, "Failed to create an {} context: {}", request, e)
            },
            Error::Context(e) => e.fmt(f),
            Error::Unmet(e) => e.fmt(f),
            Error::Framebuffer(e) => e.fmt(f),
            Error::Program(e) => e.fmt(f),
            Error::TestError(e) => e.fmt(f),
            Error::Image(e) => write!(f, "Failed to write the image: {}", e),
        }
    }
}

impl StdError for Error {}

impl From<LoadError> for Error {
    fn from(error: LoadError) -> Error {
        Error::LoadError(error)
    }
}

impl From<context::CreationError> for Error {
    fn from(error: context::CreationError) -> Error {
        Error::Context(error)
    }
}

impl From<Unmet> for Error {
    fn from(error: Unmet) -> Error {
        Error::Unmet(error)
    }
}

impl From<IncompleteFramebuffer> for Error {
    fn from(error: IncompleteFramebuffer) -> Error {
        Error::Framebuffer(error)
    }
}

impl From<ProgramCreationError> for Error {
    fn from(error: ProgramCreationError) -> Error {
        Error::Program(error)
    }
}

impl From<tester::Error> for Error {
    fn from(error: tester::Error) -> Error {
        Error::TestError(error)
    }
}

impl From<image::ImageError> for Error {
    fn from(error: image::ImageError) -> Error {
        Error::Image(error)
    }
}

pub struct Runner<F> {
    config: Config,
    factory: F,
    context: Option<Rc<Context>>,
}

impl<F: BackendFactory> Runner<F> {
    pub fn new(config: Config, factory: F) -> Runner<F> {
        Runner { config, factory, context: None }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn context_for_script(&mut self, script: &Script) -> Result<Rc<Context>, Error> {
        let request = script.requirements().context_request();

        // Only one window exists at a time, so the old context goes before the new one is made
        if self.context.as_ref().map_or(false, |c| c.request() != &request) {
            debug!("dropping the {} context", self.context_request_name());
            self.context = None;
        }

        match &self.context {
            Some(c) => Ok(Rc::clone(c)),
            None => {
                let backend = self.factory
                                  .create(&request)
                                  .map_err(|e| Error::Backend(request.clone(), Box::new(e)))?;
                let context = Context::new(backend)?;

                Ok(Rc::clone(self.context.insert(Rc::new(context))))
            },
        }
    }

    fn context_request_name(&self) -> String {
        self.context.as_ref().map_or_else(String::new, |c| c.request().to_string())
    }

    pub fn execute_script(&mut self, script: &Script) -> Result<(), Error> {
        let context = self.context_for_script(script)?;
        context.make_current();

        script.requirements().check(&*context)?;

        let framebuffer = Framebuffer::new(&context, script.window_size())?;

        let program = if script.has_shaders() {
            match Program::new(&context, script) {
                Ok(program) => Ok(Some(program)),
                Err(e) if script.expects_link_error() => {
                    debug!("program failed to link as expected: {}", e);
                    Err(e)
                },
                Err(e) => return Err(e.into()),
            }
        } else {
            Ok(None)
        };

        let state = match &program {
            Ok(Some(program)) => ProgramState::Linked(program),
            Ok(None) => ProgramState::None,
            Err(e) => ProgramState::Failed(e),
        };

        let result = tester::run(&context, &framebuffer, script, state);

        if let Some(path) = self.config.image() {
            write_image(&framebuffer, path)?;
        }

        Ok(result?)
    }

    /// Loads and runs one script file.
    pub fn execute(&mut self, source: &Source) -> Result<(), Error> {
        let script = Script::load_with_window_size(source, self.config.window_size())?;

        self.execute_script(&script)
    }

    /// Runs one file and prints why it didn't pass.
    pub fn run_file(&mut self, filename: &Path) -> TestResult {
        let mut source = Source::from_file(filename);

        for replacement in self.config.token_replacements() {
            source.add_token_replacement(replacement.token.as_str(),
                                         replacement.replacement.as_str());
        }

        match self.execute(&source) {
            Ok(()) => TestResult::Pass,
            Err(e) => {
                let result = e.result();
                if result == TestResult::Skip {
                    info!("{}: skipped: {}", source.filename(), e);
                }
                eprintln!("{}", e);
                result
            },
        }
    }

    /// Runs every file and returns the merged result.
    ///
    /// With more than one file, each is reported as a subtest named after its path.
    pub fn run_files<P: AsRef<Path>>(&mut self, filenames: &[P]) -> TestResult {
        let mut overall_result = TestResult::Skip;

        for filename in filenames {
            let filename = filename.as_ref();
            let as_subtest = filenames.len() > 1;

            if as_subtest && !self.config.quiet() {
                println!("{}", filename.display());
            }

            let result = self.run_file(filename);

            if as_subtest {
                println!("{}", result.subtest_protocol_line(&filename.display().to_string()));
            }

            overall_result = overall_result.merge(result);
        }

        overall_result
    }
}

fn write_image(framebuffer: &Framebuffer, path: &Path) -> Result<(), Error> {
    let (width, height) = framebuffer.dimensions();
    let data = framebuffer.read_rgba8();

    // GL rows start at the bottom
    let image = RgbaImage::from_fn(width, height, |x, y| {
        let i = ((height - 1 - y) as usize * width as usize + x as usize) * 4;
        Rgba([data[i], data[i + 1], data[i + 2], data[i + 3]])
    });

    image.save_with_format(path, ImageFormat::Png)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::Backend;
    use std::cell::Cell;

    #[derive(Debug)]
    struct NoDisplay;

    impl fmt::Display for NoDisplay {
        fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
            write!(f, "no display")
        }
    }

    impl StdError for NoDisplay {}

    struct FailingFactory<'a> {
        calls: &'a Cell<usize>,
    }

    impl<'a> BackendFactory for FailingFactory<'a> {
        type Error = NoDisplay;

        fn create(&mut self, _: &ContextRequest) -> Result<Box<dyn Backend>, NoDisplay> {
            self.calls.set(self.calls.get() + 1);
            Err(NoDisplay)
        }
    }

    #[test]
    fn load_errors_fail_before_creating_a_context() {
        let calls = Cell::new(0);
        let mut runner = Runner::new(Config::new(), FailingFactory { calls: &calls });

        let source = Source::from_string("[test]\npotato\n");
        let e = runner.execute(&source).unwrap_err();

        assert!(matches!(e, Error::LoadError(_)));
        assert_eq!(e.result(), TestResult::Fail);
        assert_eq!(e.to_string(), "line 2: Invalid test command");
        assert_eq!(calls.get(), 0);
    }

    #[test]
    fn missing_context_skips() {
        let calls = Cell::new(0);
        let mut runner = Runner::new(Config::new(), FailingFactory { calls: &calls });

        let source = Source::from_string("[require]\nGL >= 4.5\n[test]\nclear\n");
        let e = runner.execute(&source).unwrap_err();

        assert_eq!(e.result(), TestResult::Skip);
        assert_eq!(e.to_string(), "Failed to create an OpenGL 4.5 context: no display");
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn missing_files_fail() {
        let calls = Cell::new(0);
        let mut runner = Runner::new(Config::new(), FailingFactory { calls: &calls });

        let result = runner.run_files(&["/nonexistent/one.shader_test",
                                        "/nonexistent/two.shader_test"]);

        assert_eq!(result, TestResult::Fail);
        assert_eq!(calls.get(), 0);
    }
}
