//! Texel data for the `texture` commands.
//!
//! Every generator returns tightly packed rows of RGBA floats (or single depth floats), bottom
//! row first as `glTexImage2D` expects.

/// Colors of the quadrants of the rgbw texture.
pub const RED: [f32; 4] = [1.0, 0.0, 0.0, 1.0];
pub const GREEN: [f32; 4] = [0.0, 1.0, 0.0, 1.0];
pub const BLUE: [f32; 4] = [0.0, 0.0, 1.0, 1.0];
pub const WHITE: [f32; 4] = [1.0, 1.0, 1.0, 1.0];

/// Size of level 0 of the miptree texture.
pub const MIPTREE_SIZE: u32 = 32;

/// One color per level of the miptree texture, from 32×32 down to 1×1.
pub const MIPTREE_COLORS: [[f32; 4]; 6] = [
    RED,
    GREEN,
    BLUE,
    WHITE,
    [1.0, 1.0, 0.0, 1.0],
    [1.0, 0.0, 1.0, 1.0],
];

fn fill<F>(width: u32, height: u32, mut texel: F) -> Vec<f32>
    where F: FnMut(u32, u32) -> [f32; 4]
{
    let mut data = Vec::with_capacity(width as usize * height as usize * 4);

    for y in 0..height {
        for x in 0..width {
            data.extend_from_slice(&texel(x, y));
        }
    }

    data
}

/// A texture split in four quadrants: red in the bottom left, green in the bottom right, blue
/// in the top left and white in the top right.
pub fn rgbw(width: u32, height: u32) -> Vec<f32> {
    fill(width, height, |x, y| {
        match (x < width / 2, y < height / 2) {
            (true, true) => RED,
            (false, true) => GREEN,
            (true, false) => BLUE,
            (false, false) => WHITE,
        }
    })
}

/// A two by two checkerboard. The bottom left square uses `color1`.
pub fn checkerboard(width: u32, height: u32, color1: [f32; 4], color2: [f32; 4]) -> Vec<f32> {
    let square_width = (width / 2).max(1);
    let square_height = (height / 2).max(1);

    fill(width, height, |x, y| {
        if (x / square_width + y / square_height) % 2 == 0 {
            color1
        } else {
            color2
        }
    })
}

/// The levels of the miptree texture as `(size, texels)` pairs.
pub fn miptree() -> Vec<(u32, Vec<f32>)> {
    MIPTREE_COLORS.iter()
                  .enumerate()
                  .map(|(level, &color)| {
                      let size = MIPTREE_SIZE >> level;
                      (size, fill(size, size, |_, _| color))
                  })
                  .collect()
}

/// Depth values increasing from left to right, sampled at the texel centers.
pub fn depth_ramp(width: u32, height: u32) -> Vec<f32> {
    let mut data = Vec::with_capacity(width as usize * height as usize);

    for _ in 0..height {
        data.extend((0..width).map(|x| (x as f32 + 0.5) / width as f32));
    }

    data
}
