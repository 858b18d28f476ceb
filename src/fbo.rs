/*!
The offscreen framebuffer that scripts render into.

Every script draws into a framebuffer object of the script's window size instead of the
window's default framebuffer, which may be hidden, scaled or not exist at all. The color
attachment is an RGBA8 renderbuffer. Depth and stencil share a DEPTH24_STENCIL8
renderbuffer.

Reading pixels back only works while the framebuffer is bound for reading. `fb` commands can
redirect drawing to a texture, in which case probes read from the texture instead.

*/
use std::error::Error;
use std::fmt;

use crate::context::Context;
use crate::enums;
use crate::gl;
use crate::gl::types::{GLenum, GLint, GLsizei, GLuint};

/// Error returned by `glCheckFramebufferStatus`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IncompleteFramebuffer(pub GLenum);

impl fmt::Display for IncompleteFramebuffer {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Framebuffer is incomplete: {}", enums::name_of(self.0))
    }
}

impl Error for IncompleteFramebuffer {}

/// Checks the framebuffer bound to `GL_FRAMEBUFFER`.
pub fn check_status(context: &Context) -> Result<(), IncompleteFramebuffer> {
    let status = unsafe { context.gl().CheckFramebufferStatus(gl::FRAMEBUFFER) };

    if status == gl::FRAMEBUFFER_COMPLETE {
        Ok(())
    } else {
        Err(IncompleteFramebuffer(status))
    }
}

pub struct Framebuffer<'a> {
    context: &'a Context,
    id: GLuint,
    color: GLuint,
    depth_stencil: GLuint,
    dimensions: (u32, u32),
}

impl<'a> Framebuffer<'a> {
    /// Creates the framebuffer and binds it for drawing and reading.
    pub fn new(context: &'a Context, dimensions: (u32, u32))
               -> Result<Framebuffer<'a>, IncompleteFramebuffer>
    {
        let gl = context.gl();
        let (width, height) = (dimensions.0 as GLsizei, dimensions.1 as GLsizei);

        let framebuffer = unsafe {
            let mut renderbuffers = [0; 2];
            gl.GenRenderbuffers(2, renderbuffers.as_mut_ptr());

            gl.BindRenderbuffer(gl::RENDERBUFFER, renderbuffers[0]);
            gl.RenderbufferStorage(gl::RENDERBUFFER, gl::RGBA8, width, height);
            gl.BindRenderbuffer(gl::RENDERBUFFER, renderbuffers[1]);
            gl.RenderbufferStorage(gl::RENDERBUFFER, gl::DEPTH24_STENCIL8, width, height);
            gl.BindRenderbuffer(gl::RENDERBUFFER, 0);

            let mut id = 0;
            gl.GenFramebuffers(1, &mut id);
            gl.BindFramebuffer(gl::FRAMEBUFFER, id);
            gl.FramebufferRenderbuffer(gl::FRAMEBUFFER, gl::COLOR_ATTACHMENT0,
                                       gl::RENDERBUFFER, renderbuffers[0]);
            gl.FramebufferRenderbuffer(gl::FRAMEBUFFER, gl::DEPTH_ATTACHMENT,
                                       gl::RENDERBUFFER, renderbuffers[1]);
            gl.FramebufferRenderbuffer(gl::FRAMEBUFFER, gl::STENCIL_ATTACHMENT,
                                       gl::RENDERBUFFER, renderbuffers[1]);

            Framebuffer {
                context,
                id,
                color: renderbuffers[0],
                depth_stencil: renderbuffers[1],
                dimensions,
            }
        };

        check_status(context)?;
        framebuffer.reset_viewport();

        Ok(framebuffer)
    }

    pub fn id(&self) -> GLuint {
        self.id
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.dimensions
    }

    /// Binds the framebuffer to `target`, which is one of `GL_FRAMEBUFFER`,
    /// `GL_DRAW_FRAMEBUFFER` or `GL_READ_FRAMEBUFFER`.
    pub fn bind(&self, target: GLenum) {
        unsafe { self.context.gl().BindFramebuffer(target, self.id) };
    }

    pub fn reset_viewport(&self) {
        unsafe {
            self.context.gl().Viewport(0, 0, self.dimensions.0 as GLsizei,
                                       self.dimensions.1 as GLsizei);
        }
    }

    /// Reads the whole color attachment as RGBA8, bottom row first.
    pub fn read_rgba8(&self) -> Vec<u8> {
        let gl = self.context.gl();
        let (width, height) = self.dimensions;
        let mut data = vec![0u8; width as usize * height as usize * 4];

        unsafe {
            let mut previous: GLint = 0;
            gl.GetIntegerv(gl::READ_FRAMEBUFFER_BINDING, &mut previous);

            self.bind(gl::READ_FRAMEBUFFER);
            gl.PixelStorei(gl::PACK_ALIGNMENT, 1);
            gl.ReadPixels(0, 0, width as GLsizei, height as GLsizei, gl::RGBA,
                          gl::UNSIGNED_BYTE, data.as_mut_ptr() as *mut _);

            gl.BindFramebuffer(gl::READ_FRAMEBUFFER, previous as GLuint);
        }

        data
    }
}

impl<'a> Drop for Framebuffer<'a> {
    fn drop(&mut self) {
        let gl = self.context.gl();

        unsafe {
            gl.BindFramebuffer(gl::FRAMEBUFFER, 0);
            gl.DeleteFramebuffers(1, &self.id);
            gl.DeleteRenderbuffers(2, [self.color, self.depth_stencil].as_ptr());
        }
    }
}

/// Reads a rectangle of the framebuffer bound for reading, as RGBA in the 0-1 range.
///
/// The rectangle must lie within the framebuffer.
pub fn read_pixels(context: &Context, x: u32, y: u32, width: u32, height: u32) -> Vec<[f64; 4]> {
    let gl = context.gl();
    let mut data = vec![0u8; width as usize * height as usize * 4];

    unsafe {
        gl.PixelStorei(gl::PACK_ALIGNMENT, 1);
        gl.ReadPixels(x as GLint, y as GLint, width as GLsizei, height as GLsizei, gl::RGBA,
                      gl::UNSIGNED_BYTE, data.as_mut_ptr() as *mut _);
    }

    data.chunks_exact(4)
        .map(|p| {
            [
                p[0] as f64 / 255.0,
                p[1] as f64 / 255.0,
                p[2] as f64 / 255.0,
                p[3] as f64 / 255.0,
            ]
        })
        .collect()
}

/// Reads one depth value of the framebuffer bound for reading.
///
/// Desktop GL only, ES can't read the depth buffer back.
pub fn read_depth(context: &Context, x: u32, y: u32) -> f64 {
    let mut depth: f32 = 0.0;

    unsafe {
        context.gl().ReadPixels(x as GLint, y as GLint, 1, 1, gl::DEPTH_COMPONENT, gl::FLOAT,
                                &mut depth as *mut f32 as *mut _);
    }

    depth as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn incomplete_message() {
        let e = IncompleteFramebuffer(gl::FRAMEBUFFER_INCOMPLETE_ATTACHMENT);
        assert_eq!(e.to_string(),
                   "Framebuffer is incomplete: GL_FRAMEBUFFER_INCOMPLETE_ATTACHMENT");
    }
}
