use std::collections::HashMap;
use std::ffi::OsString;
use std::fmt;
use std::path::PathBuf;
use std::process::ExitCode;

use shader_runner::backend::glutin::GlutinFactory;
use shader_runner::{Config, Runner, TestResult};

#[derive(Debug)]
struct Opt {
    short: Option<char>,
    long: &'static str,
    help: &'static str,
    argument_name: Option<&'static str>,
    argument_type: ArgumentType,
}

#[derive(Debug)]
enum OptError {
    UnknownOption(String),
    MissingArgument(&'static Opt),
    InvalidUtf8(&'static Opt),
}

#[derive(Debug)]
enum Error {
    OptError(OptError),
    InvalidTokenReplacement(String),
    InvalidSize(String),
    ShowHelp,
    TestFailed,
}

#[derive(Debug)]
enum ArgumentType {
    Flag,
    Filename,
    String,
    StringArray,
}

#[derive(Debug)]
enum ArgumentValue {
    Flag,
    Filename(OsString),
    String(String),
    StringArray(Vec<String>),
}

type OptValues = HashMap<&'static str, ArgumentValue>;

#[derive(Debug)]
struct Options {
    values: OptValues,
    scripts: Vec<OsString>,
}

impl fmt::Display for OptError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            OptError::UnknownOption(s) => write!(f, "Unknown option: {}", s),
            OptError::MissingArgument(o) => {
                write!(f, "Option --{} requires an argument", o.long)
            },
            OptError::InvalidUtf8(o) => {
                write!(f, "Invalid UTF-8 in argument to --{}", o.long)
            },
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::OptError(e) => e.fmt(f),
            Error::InvalidTokenReplacement(s) => {
                write!(f, "Invalid token replacement: {}", s)
            },
            Error::InvalidSize(s) => {
                write!(f, "Invalid size “{}”, expected WIDTHxHEIGHT", s)
            },
            Error::ShowHelp => format_help(f),
            Error::TestFailed => write!(f, "{}", TestResult::Fail.protocol_line()),
        }
    }
}

impl From<OptError> for Error {
    fn from(e: OptError) -> Error {
        Error::OptError(e)
    }
}

static HELP_OPTION: &str = "help";
static IMAGE_OPTION: &str = "image";
static REPLACE_OPTION: &str = "replace";
static QUIET_OPTION: &str = "quiet";
static SIZE_OPTION: &str = "size";

static OPTIONS: [Opt; 5] = [
    Opt {
        short: Some('h'),
        long: HELP_OPTION,
        help: "Show this help message",
        argument_name: None,
        argument_type: ArgumentType::Flag,
    },
    Opt {
        short: Some('i'),
        long: IMAGE_OPTION,
        help: "Write the final rendering to IMG as a PNG image",
        argument_name: Some("IMG"),
        argument_type: ArgumentType::Filename,
    },
    Opt {
        short: Some('D'),
        long: REPLACE_OPTION,
        help: "Replace occurences of TOK with REPL in the scripts",
        argument_name: Some("TOK=REPL"),
        argument_type: ArgumentType::StringArray,
    },
    Opt {
        short: Some('q'),
        long: QUIET_OPTION,
        help: "Don’t print any non-error information to stdout",
        argument_name: None,
        argument_type: ArgumentType::Flag,
    },
    Opt {
        short: None,
        long: SIZE_OPTION,
        help: "Framebuffer size for scripts without a SIZE requirement",
        argument_name: Some("WxH"),
        argument_type: ArgumentType::String,
    },
];

// Piglit passes these to every test. Rendering is always offscreen and never waits anyway.
static IGNORED_OPTIONS: [&str; 2] = ["-auto", "-fbo"];

fn format_help(f: &mut fmt::Formatter) -> fmt::Result {
    writeln!(
        f,
        "usage: shader_runner [OPTION]… SCRIPT…\n\
         Runs the shader test script SCRIPT\n\
         \n\
         Options:"
    )?;

    let longest_long = OPTIONS
        .iter()
        .map(|o| o.long.chars().count())
        .max()
        .unwrap_or(0);
    let longest_arg = OPTIONS
        .iter()
        .map(|o| o.argument_name.map(|n| n.chars().count()).unwrap_or(0))
        .max()
        .unwrap_or(0);

    for (i, option) in OPTIONS.iter().enumerate() {
        if i > 0 {
            writeln!(f)?;
        }

        write!(f, " ")?;

        match option.short {
            Some(c) => write!(f, "-{},", c)?,
            None => write!(f, "   ")?,
        }

        write!(
            f,
            "--{:long_width$} {:arg_width$} {}",
            option.long,
            option.argument_name.unwrap_or(""),
            option.help,
            long_width = longest_long,
            arg_width = longest_arg,
        )?;
    }

    Ok(())
}

fn process_argument<I>(
    values: &mut OptValues,
    args: &mut I,
    opt: &'static Opt,
) -> Result<(), OptError>
    where I: Iterator<Item = OsString>
{
    match opt.argument_type {
        ArgumentType::Flag => {
            values.insert(opt.long, ArgumentValue::Flag);
        },
        ArgumentType::Filename => match args.next() {
            Some(filename) => {
                values.insert(opt.long, ArgumentValue::Filename(filename));
            },
            None => return Err(OptError::MissingArgument(opt)),
        },
        ArgumentType::String => match args.next() {
            Some(arg) => match arg.into_string() {
                Ok(s) => {
                    values.insert(opt.long, ArgumentValue::String(s));
                },
                Err(_) => return Err(OptError::InvalidUtf8(opt)),
            },
            None => return Err(OptError::MissingArgument(opt)),
        },
        ArgumentType::StringArray => match args.next() {
            Some(arg) => match arg.into_string() {
                Ok(s) => {
                    values.entry(opt.long)
                        .and_modify(|value| match value {
                            ArgumentValue::StringArray(values) => values.push(s.clone()),
                            _ => unreachable!(),
                        })
                        .or_insert_with(|| ArgumentValue::StringArray(vec![s.clone()]));
                },
                Err(_) => return Err(OptError::InvalidUtf8(opt)),
            },
            None => return Err(OptError::MissingArgument(opt)),
        },
    }

    Ok(())
}

fn process_long_arg<I>(
    values: &mut OptValues,
    args: &mut I,
    arg: &str
) -> Result<(), OptError>
    where I: Iterator<Item = OsString>
{
    for opt in OPTIONS.iter() {
        if opt.long.eq(arg) {
            return process_argument(values, args, opt);
        }
    }

    Err(OptError::UnknownOption(format!("--{}", arg)))
}

fn process_short_args<I>(
    values: &mut OptValues,
    args: &mut I,
    arg: &str
) -> Result<(), OptError>
    where I: Iterator<Item = OsString>
{
    if arg.is_empty() {
        return Err(OptError::UnknownOption("-".to_string()));
    }

    'arg_loop: for ch in arg.chars() {
        for opt in OPTIONS.iter() {
            if let Some(opt_ch) = opt.short {
                if opt_ch == ch {
                    process_argument(values, args, opt)?;
                    continue 'arg_loop;
                }
            }
        }

        return Err(OptError::UnknownOption(format!("{}", ch)));
    }

    Ok(())
}

fn parse_options<I>(
    mut args: I
) -> Result<Options, OptError>
    where I: Iterator<Item = OsString>
{
    let mut values = HashMap::new();
    let mut scripts = Vec::new();

    // Skip the first arg
    if args.next().is_none() {
        return Ok(Options { values, scripts });
    }

    while let Some(arg) = args.next() {
        match arg.to_str() {
            Some(arg_str) => {
                if arg_str == "--" {
                    scripts.extend(args);
                    break;
                } else if IGNORED_OPTIONS.contains(&arg_str) {
                    continue;
                } else if let Some(long) = arg_str.strip_prefix("--") {
                    process_long_arg(&mut values, &mut args, long)?;
                } else if let Some(short) = arg_str.strip_prefix('-') {
                    process_short_args(&mut values, &mut args, short)?;
                } else {
                    scripts.push(arg);
                }
            },
            None => scripts.push(arg),
        }
    }

    Ok(Options { values, scripts })
}

fn parse_size(s: &str) -> Result<(u32, u32), Error> {
    let invalid = || Error::InvalidSize(s.to_owned());
    let (width, height) = s.split_once('x').ok_or_else(invalid)?;
    let width = width.parse::<u32>().map_err(|_| invalid())?;
    let height = height.parse::<u32>().map_err(|_| invalid())?;

    if width == 0 || height == 0 {
        return Err(invalid());
    }

    Ok((width, height))
}

fn set_up_config(options: &Options) -> Result<Config, Error> {
    let mut config = Config::new();

    if let Some(ArgumentValue::Flag) = options.values.get(QUIET_OPTION) {
        config.set_quiet(true);
    }

    if let Some(ArgumentValue::Filename(filename)) = options.values.get(IMAGE_OPTION) {
        config.set_image(Some(PathBuf::from(filename)));
    }

    if let Some(ArgumentValue::String(size)) = options.values.get(SIZE_OPTION) {
        config.set_window_size(parse_size(size)?);
    }

    if let Some(ArgumentValue::StringArray(replacements)) = options.values.get(REPLACE_OPTION) {
        for replacement in replacements {
            match replacement.split_once('=') {
                None => {
                    return Err(Error::InvalidTokenReplacement(replacement.to_owned()));
                },
                Some((token, replacement)) => config.add_token_replacement(token, replacement),
            }
        }
    }

    Ok(config)
}

fn run() -> Result<(), Error> {
    let options = parse_options(std::env::args_os())?;

    if options.values.contains_key(HELP_OPTION) || options.scripts.is_empty() {
        return Err(Error::ShowHelp);
    }

    let config = set_up_config(&options)?;
    let quiet = config.quiet();
    let factory = GlutinFactory::new(config.window_size());
    let mut runner = Runner::new(config, factory);

    let scripts: Vec<PathBuf> = options.scripts.iter().map(PathBuf::from).collect();
    let overall_result = runner.run_files(&scripts);

    match overall_result {
        TestResult::Fail => Err(Error::TestFailed),
        TestResult::Pass if quiet => Ok(()),
        _ => {
            println!("{}", overall_result.protocol_line());
            Ok(())
        },
    }
}

fn main() -> ExitCode {
    env_logger::init();

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(Error::TestFailed) => {
            println!("{}", Error::TestFailed);
            ExitCode::FAILURE
        },
        Err(e) => {
            eprintln!("{}", e);
            ExitCode::FAILURE
        },
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn args(list: &[&str]) -> impl Iterator<Item = OsString> {
        list.iter().map(OsString::from).collect::<Vec<_>>().into_iter()
    }

    #[test]
    fn all_arg_types() {
        let options = parse_options(args(&[
            "shader_runner",
            "-qi", "screenshot.png",
            "--replace", "bad=aĉa",
            "-D", "good=bona",
            "--size", "64x32",
            "-auto", "-fbo",
            "script.shader_test",
        ])).unwrap();

        assert!(matches!(&options.values[QUIET_OPTION], ArgumentValue::Flag));

        let ArgumentValue::Filename(image) = &options.values[IMAGE_OPTION]
        else { unreachable!(); };
        assert_eq!(image, "screenshot.png");

        let ArgumentValue::StringArray(replacements) = &options.values[REPLACE_OPTION]
        else { unreachable!(); };
        assert_eq!(replacements, &["bad=aĉa", "good=bona"]);

        assert_eq!(options.scripts, ["script.shader_test"]);

        let config = set_up_config(&options).unwrap();
        assert!(config.quiet());
        assert_eq!(config.window_size(), (64, 32));
        assert_eq!(config.image().unwrap().to_str(), Some("screenshot.png"));
        assert_eq!(config.token_replacements().len(), 2);
        assert_eq!(config.token_replacements()[0].replacement, "aĉa");
    }

    #[test]
    fn scripts_after_separator() {
        let options = parse_options(args(&["shader_runner", "--", "-q", "a"])).unwrap();

        assert!(options.values.is_empty());
        assert_eq!(options.scripts, ["-q", "a"]);
    }

    #[test]
    fn option_errors() {
        let e = parse_options(args(&["shader_runner", "--potato"])).unwrap_err();
        assert_eq!(e.to_string(), "Unknown option: --potato");

        let e = parse_options(args(&["shader_runner", "-x"])).unwrap_err();
        assert_eq!(e.to_string(), "Unknown option: x");

        let e = parse_options(args(&["shader_runner", "-i"])).unwrap_err();
        assert_eq!(e.to_string(), "Option --image requires an argument");
    }

    #[test]
    fn sizes() {
        assert_eq!(parse_size("250x250").unwrap(), (250, 250));
        assert_eq!(parse_size("1x2").unwrap(), (1, 2));

        for bad in ["", "12", "0x4", "4x", "ax4", "4x4x4"] {
            assert_eq!(parse_size(bad).unwrap_err().to_string(),
                       format!("Invalid size “{}”, expected WIDTHxHEIGHT", bad));
        }
    }

    #[test]
    fn bad_replacement() {
        let options = parse_options(args(&["shader_runner", "-D", "nothing", "a"])).unwrap();

        assert_eq!(set_up_config(&options).unwrap_err().to_string(),
                   "Invalid token replacement: nothing");
    }
}
