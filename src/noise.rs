use crate::rng::hash2;

#[inline]
fn smootherstep(t: f32) -> f32 {
    t * t * t * (t * (t * 6.0 - 15.0) + 10.0)
}

#[inline]
fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

/// 16 evenly-spaced unit gradients (every 22.5°).
#[inline]
fn grad16(hash: u32, dx: f32, dy: f32) -> f32 {
    match hash & 15 {
        0  =>  dx,
        1  =>  0.924 * dx + 0.383 * dy,
        2  =>  0.707 * (dx + dy),
        3  =>  0.383 * dx + 0.924 * dy,
        4  =>  dy,
        5  => -0.383 * dx + 0.924 * dy,
        6  =>  0.707 * (-dx + dy),
        7  => -0.924 * dx + 0.383 * dy,
        8  => -dx,
        9  => -0.924 * dx - 0.383 * dy,
        10 =>  0.707 * (-dx - dy),
        11 => -0.383 * dx - 0.924 * dy,
        12 => -dy,
        13 =>  0.383 * dx - 0.924 * dy,
        14 =>  0.707 * (dx - dy),
        _  =>  0.924 * dx - 0.383 * dy,
    }
}

/// 2D gradient noise (Perlin-style), clamped to [-1, 1].
#[inline]
pub fn gradient_noise(x: f32, y: f32, seed: u32) -> f32 {
    let ix = x.floor() as i32;
    let iy = y.floor() as i32;
    let fx = x - ix as f32;
    let fy = y - iy as f32;
    let sx = smootherstep(fx);
    let sy = smootherstep(fy);

    let v00 = grad16(hash2(ix, iy, seed), fx, fy);
    let v10 = grad16(hash2(ix + 1, iy, seed), fx - 1.0, fy);
    let v01 = grad16(hash2(ix, iy + 1, seed), fx, fy - 1.0);
    let v11 = grad16(hash2(ix + 1, iy + 1, seed), fx - 1.0, fy - 1.0);

    let a = lerp(v00, v10, sx);
    let b = lerp(v01, v11, sx);
    // Raw range is ~[-0.7, 0.7]
    (lerp(a, b, sy) * 1.414).clamp(-1.0, 1.0)
}

/// 2D simplex noise, clamped to [-1, 1].
/// Triangular lattice, so its artifacts don't line up with `gradient_noise`.
pub fn simplex_noise(x: f32, y: f32, seed: u32) -> f32 {
    const F2: f32 = 0.366_025_42; // (sqrt(3) - 1) / 2
    const G2: f32 = 0.211_324_87; // (3 - sqrt(3)) / 6

    let s = (x + y) * F2;
    let i = (x + s).floor() as i32;
    let j = (y + s).floor() as i32;
    let t = (i + j) as f32 * G2;
    let x0 = x - (i as f32 - t);
    let y0 = y - (j as f32 - t);

    // Lower or upper triangle of the skewed cell
    let (i1, j1) = if x0 > y0 { (1, 0) } else { (0, 1) };

    let x1 = x0 - i1 as f32 + G2;
    let y1 = y0 - j1 as f32 + G2;
    let x2 = x0 - 1.0 + 2.0 * G2;
    let y2 = y0 - 1.0 + 2.0 * G2;

    let corner = |cx: f32, cy: f32, hash: u32| -> f32 {
        let t = 0.5 - cx * cx - cy * cy;
        if t <= 0.0 {
            0.0
        } else {
            let t2 = t * t;
            t2 * t2 * grad16(hash, cx, cy)
        }
    };

    let n0 = corner(x0, y0, hash2(i, j, seed));
    let n1 = corner(x1, y1, hash2(i + i1, j + j1, seed));
    let n2 = corner(x2, y2, hash2(i + 1, j + 1, seed));

    (70.0 * (n0 + n1 + n2)).clamp(-1.0, 1.0)
}

/// Fractal Brownian Motion over `gradient_noise`, normalised to [-1, 1].
pub fn fbm(x: f32, y: f32, seed: u32, octaves: u32, freq0: f32, lac: f32, gain: f32) -> f32 {
    let mut sum = 0.0;
    let mut amp = 1.0;
    let mut freq = freq0;
    let mut norm = 0.0;
    for i in 0..octaves {
        sum += gradient_noise(x * freq, y * freq, seed.wrapping_add(i)) * amp;
        norm += amp;
        amp *= gain;
        freq *= lac;
    }
    if norm > 0.0 { (sum / norm).clamp(-1.0, 1.0) } else { 0.0 }
}

/// `(offset - |v|)²`: folds the noise into sharp crests where `v` crosses zero.
#[inline]
pub fn ridge(v: f32, offset: f32) -> f32 {
    let r = offset - v.abs();
    r * r
}
