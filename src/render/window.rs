use anyhow::Result;
use minifb::{Key, Window, WindowOptions};

use super::{Dimensions, RasterSurface};

/// Desktop window showing a `RasterSurface`.
pub struct WindowPresenter {
    window: Window,
    buffer: Vec<u32>,
    dimensions: Dimensions,
}

impl WindowPresenter {
    pub fn new(title: &str, dimensions: Dimensions) -> Result<Self> {
        let window = Window::new(
            title,
            dimensions.width as usize,
            dimensions.height as usize,
            WindowOptions {
                resize: false,
                ..WindowOptions::default()
            },
        )?;
        Ok(Self {
            window,
            buffer: vec![0u32; dimensions.width as usize * dimensions.height as usize],
            dimensions,
        })
    }

    /// False once the window is closed or Escape is pressed.
    pub fn is_open(&self) -> bool {
        self.window.is_open() && !self.window.is_key_down(Key::Escape)
    }

    pub fn present(&mut self, surface: &RasterSurface) -> Result<()> {
        let image = surface.image();
        let width = self.dimensions.width.min(image.width());
        let height = self.dimensions.height.min(image.height());
        for y in 0..height {
            for x in 0..width {
                let [r, g, b, _] = image.get_pixel(x, y).0;
                self.buffer[(y * self.dimensions.width + x) as usize] =
                    ((r as u32) << 16) | ((g as u32) << 8) | b as u32;
            }
        }
        self.window.update_with_buffer(
            &self.buffer,
            self.dimensions.width as usize,
            self.dimensions.height as usize,
        )?;
        Ok(())
    }
}
