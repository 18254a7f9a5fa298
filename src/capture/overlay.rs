//! Diagnostic burn-in for captured frames
//!
//! Draws the nominal frame rate and, while recording, the frame index into the
//! top-left corner of an RGB24 frame using a 5x7 bitmap font.

use super::traits::{Frame, RGB_BYTES_PER_PIXEL};

const GLYPH_WIDTH: u32 = 5;
const GLYPH_HEIGHT: u32 = 7;

pub const GREEN: [u8; 3] = [0, 255, 0];
pub const RED: [u8; 3] = [255, 0, 0];

const MARGIN: u32 = 10;
const FPS_SCALE: u32 = 3;
const INDEX_SCALE: u32 = 4;

fn glyph(c: char) -> Option<[u8; 7]> {
    let rows = match c {
        '0' => [0x0E, 0x11, 0x13, 0x15, 0x19, 0x11, 0x0E],
        '1' => [0x04, 0x0C, 0x04, 0x04, 0x04, 0x04, 0x0E],
        '2' => [0x0E, 0x11, 0x01, 0x02, 0x04, 0x08, 0x1F],
        '3' => [0x1F, 0x02, 0x04, 0x02, 0x01, 0x11, 0x0E],
        '4' => [0x02, 0x06, 0x0A, 0x12, 0x1F, 0x02, 0x02],
        '5' => [0x1F, 0x10, 0x1E, 0x01, 0x01, 0x11, 0x0E],
        '6' => [0x06, 0x08, 0x10, 0x1E, 0x11, 0x11, 0x0E],
        '7' => [0x1F, 0x01, 0x02, 0x04, 0x08, 0x08, 0x08],
        '8' => [0x0E, 0x11, 0x11, 0x0E, 0x11, 0x11, 0x0E],
        '9' => [0x0E, 0x11, 0x11, 0x0F, 0x01, 0x02, 0x0C],
        'F' => [0x1F, 0x10, 0x10, 0x1E, 0x10, 0x10, 0x10],
        'P' => [0x1E, 0x11, 0x11, 0x1E, 0x10, 0x10, 0x10],
        'S' => [0x0F, 0x10, 0x10, 0x0E, 0x01, 0x01, 0x1E],
        ':' => [0x00, 0x0C, 0x0C, 0x00, 0x0C, 0x0C, 0x00],
        ' ' => [0x00; 7],
        _ => return None,
    };
    Some(rows)
}

/// Draw `text` with its top-left corner at (`x`, `y`). Pixels outside the frame
/// are clipped; characters without a glyph are skipped.
pub fn draw_text(frame: &mut Frame, text: &str, x: u32, y: u32, scale: u32, color: [u8; 3]) {
    let scale = scale.max(1);
    let advance = (GLYPH_WIDTH + 1) * scale;
    let stride = frame.width as usize * RGB_BYTES_PER_PIXEL;

    for (i, c) in text.chars().enumerate() {
        let Some(rows) = glyph(c.to_ascii_uppercase()) else {
            continue;
        };
        let origin_x = x + i as u32 * advance;

        for (row, bits) in rows.iter().enumerate() {
            for col in 0..GLYPH_WIDTH {
                if bits & (0x10 >> col) == 0 {
                    continue;
                }
                for dy in 0..scale {
                    let py = y + row as u32 * scale + dy;
                    if py >= frame.height {
                        break;
                    }
                    for dx in 0..scale {
                        let px = origin_x + col * scale + dx;
                        if px >= frame.width {
                            break;
                        }
                        let offset = py as usize * stride + px as usize * RGB_BYTES_PER_PIXEL;
                        if let Some(pixel) = frame.data.get_mut(offset..offset + RGB_BYTES_PER_PIXEL) {
                            pixel.copy_from_slice(&color);
                        }
                    }
                }
            }
        }
    }
}

/// Burn the nominal frame rate into the frame (skipped when unknown).
pub fn annotate_fps(frame: &mut Frame, frame_rate: f64) {
    if frame_rate > 0.0 {
        let text = format!("FPS:{}", frame_rate.round() as u64);
        draw_text(frame, &text, MARGIN, MARGIN, FPS_SCALE, GREEN);
    }
}

/// Burn the recording frame index below the fps line.
pub fn annotate_frame_index(frame: &mut Frame, frame_index: u64) {
    let y = MARGIN + GLYPH_HEIGHT * FPS_SCALE + MARGIN;
    draw_text(frame, &frame_index.to_string(), MARGIN, y, INDEX_SCALE, RED);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blank(width: u32, height: u32) -> Frame {
        Frame::new(width, height, vec![0; (width * height * 3) as usize], 0)
    }

    fn lit_pixels(frame: &Frame) -> usize {
        frame.data.chunks(3).filter(|p| p.iter().any(|&v| v != 0)).count()
    }

    #[test]
    fn test_draw_digit_one_scale_one() {
        let mut frame = blank(8, 8);
        draw_text(&mut frame, "1", 0, 0, 1, RED);
        // '1' lights 1 + 2 + 1 + 1 + 1 + 1 + 3 pixels
        assert_eq!(lit_pixels(&frame), 10);
        // top row: only column 2
        assert_eq!(&frame.data[2 * 3..3 * 3], &RED);
        assert_eq!(&frame.data[0..3], &[0, 0, 0]);
    }

    #[test]
    fn test_text_is_clipped_at_edges() {
        let mut frame = blank(6, 4);
        draw_text(&mut frame, "888", 3, 2, 2, GREEN);
        assert!(lit_pixels(&frame) > 0);
        assert_eq!(frame.data.len(), 6 * 4 * 3);
    }

    #[test]
    fn test_unknown_chars_are_skipped() {
        let mut frame = blank(16, 8);
        draw_text(&mut frame, "#~", 0, 0, 1, GREEN);
        assert_eq!(lit_pixels(&frame), 0);
    }

    #[test]
    fn test_fps_overlay_skipped_when_unknown() {
        let mut frame = blank(120, 60);
        annotate_fps(&mut frame, 0.0);
        assert_eq!(lit_pixels(&frame), 0);

        annotate_fps(&mut frame, 29.97);
        assert!(lit_pixels(&frame) > 0);
    }

    #[test]
    fn test_frame_index_drawn_in_red() {
        let mut frame = blank(120, 80);
        annotate_frame_index(&mut frame, 42);
        assert!(frame.data.chunks(3).any(|p| p == RED));
        assert!(!frame.data.chunks(3).any(|p| p == GREEN));
    }
}
