use image::RgbImage;

use super::{Color, Dimensions, RenderPoint, RenderRect, Surface};

/// One recorded draw call.
#[derive(Clone, Debug, PartialEq)]
pub enum DrawCommand {
    Clear,
    Frame {
        width: u32,
        height: u32,
    },
    /// A frame drawn without mirroring (server-rendered).
    FrameAsIs {
        width: u32,
        height: u32,
    },
    StrokeRect {
        rect: RenderRect,
        color: Color,
        width: f32,
    },
    Line {
        from: RenderPoint,
        to: RenderPoint,
        color: Color,
        width: f32,
    },
    Circle {
        center: RenderPoint,
        radius: f32,
        color: Color,
    },
    FillRect {
        rect: RenderRect,
        color: Color,
    },
    Text {
        text: String,
        origin: RenderPoint,
        size: f32,
        color: Color,
    },
}

/// Surface that records draw calls instead of rasterizing them.
///
/// Text is measured at a fixed advance of `0.5 * size` per character.
#[derive(Clone, Debug)]
pub struct RecordingSurface {
    dimensions: Dimensions,
    commands: Vec<DrawCommand>,
}

impl RecordingSurface {
    pub fn new(dimensions: Dimensions) -> Self {
        Self {
            dimensions,
            commands: Vec::new(),
        }
    }

    pub fn commands(&self) -> &[DrawCommand] {
        &self.commands
    }

    /// Commands since the last `clear`, i.e. the visible picture.
    pub fn last_pass(&self) -> &[DrawCommand] {
        let start = self
            .commands
            .iter()
            .rposition(|c| *c == DrawCommand::Clear)
            .unwrap_or(0);
        &self.commands[start..]
    }

    pub fn take_commands(&mut self) -> Vec<DrawCommand> {
        std::mem::take(&mut self.commands)
    }

    pub fn resize(&mut self, dimensions: Dimensions) {
        self.dimensions = dimensions;
    }
}

impl Surface for RecordingSurface {
    fn dimensions(&self) -> Dimensions {
        self.dimensions
    }

    fn clear(&mut self) {
        self.commands.push(DrawCommand::Clear);
    }

    fn draw_frame_mirrored(&mut self, frame: &RgbImage) {
        self.commands.push(DrawCommand::Frame {
            width: frame.width(),
            height: frame.height(),
        });
    }

    fn draw_frame_as_is(&mut self, frame: &RgbImage) {
        self.commands.push(DrawCommand::FrameAsIs {
            width: frame.width(),
            height: frame.height(),
        });
    }

    fn stroke_rect(&mut self, rect: RenderRect, color: Color, line_width: f32) {
        self.commands.push(DrawCommand::StrokeRect {
            rect,
            color,
            width: line_width,
        });
    }

    fn draw_line(&mut self, from: RenderPoint, to: RenderPoint, color: Color, line_width: f32) {
        self.commands.push(DrawCommand::Line {
            from,
            to,
            color,
            width: line_width,
        });
    }

    fn fill_circle(&mut self, center: RenderPoint, radius: f32, color: Color) {
        self.commands.push(DrawCommand::Circle {
            center,
            radius,
            color,
        });
    }

    fn fill_rect(&mut self, rect: RenderRect, color: Color) {
        self.commands.push(DrawCommand::FillRect { rect, color });
    }

    fn measure_text(&self, text: &str, size: f32) -> f32 {
        text.chars().count() as f32 * size * 0.5
    }

    fn fill_text(&mut self, text: &str, origin: RenderPoint, size: f32, color: Color) {
        self.commands.push(DrawCommand::Text {
            text: text.to_string(),
            origin,
            size,
            color,
        });
    }
}
