// THEORY:
// The renderer turns one step of the simulation into one complete frame on a
// `DrawingSurface`. It is deliberately dumb: the sequencer decides *what* the
// step shows (a raster, a bar vector, a node graph) and hands over a `Visual`;
// the renderer only knows the fixed layout and palette.
//
// Every frame is drawn from scratch: clear, background, title, caption, visual,
// present. Nothing from the previous step survives, so a late or skipped step
// can never leave a stale raster on screen.

use crate::core_modules::raster::raster::Raster;
use crate::core_modules::steps::StepDescriptor;
use crate::core_modules::surface::{DrawingSurface, Shape, TextAlign, TextRun};
use image::Rgba;

const BACKGROUND: Rgba<u8> = Rgba([0x1e, 0x29, 0x3b, 255]);
const TITLE_COLOR: Rgba<u8> = Rgba([0xf1, 0xf5, 0xf9, 255]);
const CAPTION_COLOR: Rgba<u8> = Rgba([0x94, 0xa3, 0xb8, 255]);
const VECTOR_COLOR: Rgba<u8> = Rgba([0x10, 0xb9, 0x81, 255]);
const NODE_COLOR: Rgba<u8> = Rgba([0x60, 0xa5, 0xfa, 255]);
// rgba(239, 68, 68, 0.3)
const DROPOUT_COLOR: Rgba<u8> = Rgba([239, 68, 68, 77]);

pub const BAR_COUNT: usize = 20;
const VECTOR_LENGTH: f32 = 200.0;
pub const NODES_PER_COLUMN: usize = 8;
pub const DROPPED_NODES: usize = 3;
const GRAPH_WIDTH: f32 = 200.0;
const GRAPH_HEIGHT: f32 = 100.0;
const NODE_RADIUS: f32 = 6.0;
const DROPPED_RADIUS: f32 = 8.0;
const STROKE_WIDTH: f32 = 2.0;

/// What a step puts in the middle of the frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Visual {
    /// The working snapshot, centred.
    Raster(Raster),
    /// Vertical bars with the given heights, left to right.
    Bars(Vec<f32>),
    /// A two-column node graph, optionally with dropped nodes overlaid. Each
    /// dropped node is given as a horizontal offset into the graph.
    Graph { dropped: Vec<f32> },
    /// Title and caption only.
    Empty,
}

/// Draws one full frame and presents it.
pub fn render_frame(surface: &mut dyn DrawingSurface, step: usize, descriptor: &StepDescriptor, visual: &Visual) {
    let (width, height) = surface.size();
    let center_x = width as f32 / 2.0;
    let center_y = height as f32 / 2.0 + 10.0;

    surface.clear();
    surface.fill_background(BACKGROUND);

    surface.draw_text(&TextRun {
        text: descriptor.name.to_string(),
        x: center_x,
        y: 30.0,
        size: 16.0,
        bold: true,
        color: TITLE_COLOR,
        align: TextAlign::Center,
    });
    surface.draw_text(&TextRun {
        text: descriptor.description.to_string(),
        x: center_x,
        y: 50.0,
        size: 12.0,
        bold: false,
        color: CAPTION_COLOR,
        align: TextAlign::Center,
    });

    match visual {
        Visual::Raster(raster) => {
            let x = (center_x - raster.width() as f32 / 2.0).round() as i64;
            let y = (center_y - raster.height() as f32 / 2.0).round() as i64;
            surface.blit_raster(raster, x, y);
        }
        Visual::Bars(heights) => draw_bars(surface, center_x, center_y, heights),
        Visual::Graph { dropped } => {
            draw_graph(surface, center_x - GRAPH_WIDTH / 2.0, center_y - GRAPH_HEIGHT / 2.0);
            for (i, offset) in dropped.iter().enumerate() {
                surface.draw_shape(&Shape::Disc {
                    center: (center_x - 80.0 + offset, center_y - 30.0 + i as f32 * 30.0),
                    radius: DROPPED_RADIUS,
                    color: DROPOUT_COLOR,
                });
            }
        }
        Visual::Empty => {}
    }

    surface.present(step);
}

fn draw_bars(surface: &mut dyn DrawingSurface, center_x: f32, center_y: f32, heights: &[f32]) {
    let start = center_x - VECTOR_LENGTH / 2.0;
    let spacing = VECTOR_LENGTH / BAR_COUNT as f32;
    let base = center_y + 20.0;

    for (i, height) in heights.iter().enumerate() {
        let x = start + i as f32 * spacing;
        surface.draw_shape(&Shape::Line {
            from: (x, base),
            to: (x, base - height),
            width: STROKE_WIDTH,
            color: VECTOR_COLOR,
        });
    }
}

fn draw_graph(surface: &mut dyn DrawingSurface, x: f32, y: f32) {
    let spacing = GRAPH_HEIGHT / (NODES_PER_COLUMN + 1) as f32;

    for i in 0..NODES_PER_COLUMN {
        let node_y = y + (i + 1) as f32 * spacing;

        // Input node, output node, then the connection between them.
        surface.draw_shape(&Shape::Disc {
            center: (x + 20.0, node_y),
            radius: NODE_RADIUS,
            color: NODE_COLOR,
        });
        surface.draw_shape(&Shape::Disc {
            center: (x + GRAPH_WIDTH - 20.0, node_y),
            radius: NODE_RADIUS,
            color: NODE_COLOR,
        });
        surface.draw_shape(&Shape::Line {
            from: (x + 26.0, node_y),
            to: (x + GRAPH_WIDTH - 26.0, node_y),
            width: STROKE_WIDTH,
            color: NODE_COLOR,
        });
    }
}
