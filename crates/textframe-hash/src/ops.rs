use textframe_types::RgbFrame;

/// BT.601 luminance, one f32 per pixel with the stride padding dropped.
pub fn luminance(frame: &RgbFrame) -> Vec<f32> {
    let width = frame.width() as usize;
    let height = frame.height() as usize;
    let mut out = Vec::with_capacity(width * height);
    for y in 0..height {
        let row = &frame.row(y)[..width * 3];
        for px in row.chunks_exact(3) {
            let value = 0.299 * px[0] as f32 + 0.587 * px[1] as f32 + 0.114 * px[2] as f32;
            out.push(value);
        }
    }
    out
}

/// Box-filter downsample: every destination cell averages the source window
/// `[floor(d*ratio), ceil((d+1)*ratio))` it covers, at least one pixel wide.
pub fn resize_average(
    pixels: &[f32],
    width: usize,
    height: usize,
    new_width: usize,
    new_height: usize,
) -> Vec<f32> {
    assert_eq!(pixels.len(), width * height);
    if width == 0 || height == 0 || new_width == 0 || new_height == 0 {
        return vec![0.0; new_width * new_height];
    }
    let x_ratio = width as f32 / new_width as f32;
    let y_ratio = height as f32 / new_height as f32;
    let mut out = Vec::with_capacity(new_width * new_height);
    for dy in 0..new_height {
        let y_start = (dy as f32 * y_ratio) as usize;
        let y_end = (((dy + 1) as f32 * y_ratio).ceil() as usize).clamp(y_start + 1, height);
        for dx in 0..new_width {
            let x_start = (dx as f32 * x_ratio) as usize;
            let x_end = (((dx + 1) as f32 * x_ratio).ceil() as usize).clamp(x_start + 1, width);
            let mut acc = 0.0f32;
            for sy in y_start..y_end {
                let row = &pixels[sy * width + x_start..sy * width + x_end];
                acc += row.iter().sum::<f32>();
            }
            let area = ((y_end - y_start) * (x_end - x_start)) as f32;
            out.push(acc / area);
        }
    }
    out
}

fn dct_basis(n: usize, k: usize, len: usize) -> f32 {
    (std::f32::consts::PI / len as f32 * (n as f32 + 0.5) * k as f32).cos()
}

/// Separable 2D DCT-II, unnormalized; only relative coefficient magnitudes
/// matter for the hash.
pub fn dct2(input: &[f32], width: usize, height: usize) -> Vec<f32> {
    assert_eq!(input.len(), width * height);
    if width == 0 || height == 0 {
        return Vec::new();
    }
    let mut by_rows = vec![0.0f32; width * height];
    for y in 0..height {
        let row = &input[y * width..(y + 1) * width];
        for (u, slot) in by_rows[y * width..(y + 1) * width].iter_mut().enumerate() {
            *slot = row
                .iter()
                .enumerate()
                .map(|(x, &value)| value * dct_basis(x, u, width))
                .sum();
        }
    }
    let mut out = vec![0.0f32; width * height];
    for x in 0..width {
        for v in 0..height {
            out[v * width + x] = (0..height)
                .map(|y| by_rows[y * width + x] * dct_basis(y, v, height))
                .sum();
        }
    }
    out
}
