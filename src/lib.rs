/*!
Runs Piglit `.shader_test` scripts against an OpenGL implementation.

A script is a text file split in sections:

```text
[require]
GLSL >= 1.30

[vertex shader passthrough]

[fragment shader]
#version 130
uniform vec4 color;
void main() { gl_FragColor = color; }

[test]
uniform vec4 color 0.0 1.0 0.0 1.0
draw rect -1 -1 2 2
probe all rgba 0.0 1.0 0.0 1.0
```

# Loading

A [`Script`] is loaded from a [`Source`], which is either a file or a string. Loading checks
the syntax of every section and turns the `[test]` section into a list of
[`Operation`](script::Operation)s. No GL call is made.

```no_run
use shader_runner::{Script, Source};

let script = Script::load(&Source::from_file("draw.shader_test")).unwrap();
println!("{} commands", script.commands().len());
```

# Running

A [`Runner`] owns a [`BackendFactory`](backend::BackendFactory) and creates a context for each
script, reusing the previous one when the requirements ask for the same kind of context.

```no_run
# #[cfg(feature = "glutin_backend")]
# fn main() {
use shader_runner::{Config, Runner};
use shader_runner::backend::glutin::GlutinFactory;

let config = Config::new();
let factory = GlutinFactory::new(config.window_size());
let mut runner = Runner::new(config, factory);

let result = runner.run_files(&["draw.shader_test"]);
println!("{}", result.protocol_line());
# }
# #[cfg(not(feature = "glutin_backend"))]
# fn main() {}
```

*/
#![allow(clippy::missing_safety_doc)]

pub use crate::config::Config;
pub use crate::context::{Context, ContextRequest, Profile};
pub use crate::result::TestResult;
pub use crate::runner::Runner;
pub use crate::script::{LoadError, Script};
pub use crate::source::Source;
pub use crate::version::{Api, Version};

pub mod backend;
pub mod config;
pub mod context;
pub mod enums;
pub mod fbo;
pub mod parse_num;
pub mod program;
pub mod requirements;
pub mod result;
pub mod runner;
pub mod script;
pub mod source;
pub mod stream;
pub mod tester;
pub mod texture;
pub mod tolerance;
pub mod uniform;
pub mod vbo;
pub mod version;

#[allow(clippy::all, non_upper_case_globals, non_snake_case, unused)]
pub mod gl {
    include!(concat!(env!("OUT_DIR"), "/gl_bindings.rs"));
}
