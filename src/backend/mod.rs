/*!

The `backend` module allows the runner to drive any OpenGL context.

A backend only has to provide function pointers and the ability to make its context current.
Everything else, such as framebuffer objects and state tracking, is done by the
[`Context`](crate::context::Context) built on top of it.

*/
use std::os::raw::c_void;
use std::rc::Rc;
use std::ops::Deref;

use crate::context::ContextRequest;

#[cfg(feature = "glutin_backend")]
pub mod glutin;

/// Trait for types that can be used as a backend for a runner context.
///
/// # Safety
///
/// `get_proc_address` must return valid function pointers for the context that `make_current`
/// makes current, or null.
pub unsafe trait Backend {
    /// Returns the address of an OpenGL function.
    ///
    /// Must be called in the same thread and after the backend has been made current
    /// with `make_current`.
    unsafe fn get_proc_address(&self, symbol: &str) -> *const c_void;

    /// Returns the dimensions of the window, or screen, etc.
    fn get_framebuffer_dimensions(&self) -> (u32, u32);

    /// Returns true if the OpenGL context is the current one in the thread.
    fn is_current(&self) -> bool;

    /// Makes the OpenGL context the current context in the current thread.
    unsafe fn make_current(&self);

    /// The request this context was created for.
    fn request(&self) -> &ContextRequest;
}

unsafe impl<T> Backend for Rc<T> where T: Backend {
    unsafe fn get_proc_address(&self, symbol: &str) -> *const c_void {
        self.deref().get_proc_address(symbol)
    }

    fn get_framebuffer_dimensions(&self) -> (u32, u32) {
        self.deref().get_framebuffer_dimensions()
    }

    fn is_current(&self) -> bool {
        self.deref().is_current()
    }

    unsafe fn make_current(&self) {
        self.deref().make_current();
    }

    fn request(&self) -> &ContextRequest {
        self.deref().request()
    }
}

/// Something that can create backends on demand.
///
/// The runner asks for a new backend whenever a script needs a context that differs from the
/// one it already has.
pub trait BackendFactory {
    /// Error produced when a context can't be created.
    type Error: std::error::Error + 'static;

    /// Creates a backend whose context satisfies `request`.
    fn create(&mut self, request: &ContextRequest) -> Result<Box<dyn Backend>, Self::Error>;
}
