//! Resampling of full resolution channels onto coarser pyramid levels

use crate::types::Pixel;
use ndarray::{Array3, ArrayView3};
use num_traits::{Bounded, NumCast};

/// Spacing (x, y, z) of a level with `target_size` voxels covering the same
/// samples as a level 0 grid of `source_size` voxels at `spacing`.
///
/// Axes with a single target voxel get spacing 1.
pub fn resampled_spacing(
    source_size: [usize; 3],
    spacing: [f64; 3],
    target_size: [usize; 3],
) -> [f64; 3] {
    let mut out = [1.0; 3];
    for axis in 0..3 {
        if target_size[axis] > 1 {
            out[axis] = (source_size[axis] as f64 - 1.0) * spacing[axis]
                / (target_size[axis] as f64 - 1.0);
        }
    }
    out
}

/// Neighbours and weight of one output sample along one axis.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Tap {
    lower: usize,
    upper: usize,
    weight: f64,
}

/// Sample positions along one axis; `None` where the sample falls outside the input.
fn taps(source_len: usize, target_len: usize, step: f64) -> Vec<Option<Tap>> {
    let last = source_len.saturating_sub(1) as isize;
    (0..target_len)
        .map(|i| {
            let position = i as f64 * step;
            if position < -0.5 || position >= source_len as f64 - 0.5 {
                return None;
            }
            let base = position.floor();
            let lower = (base as isize).clamp(0, last) as usize;
            let upper = (base as isize + 1).clamp(0, last) as usize;
            Some(Tap {
                lower,
                upper,
                weight: position - base,
            })
        })
        .collect()
}

/// Trilinear resampling of `data` (z, y, x) onto a grid of `target_size`
/// (x, y, z) voxels sharing the input origin, with output voxels
/// `target_spacing / spacing` input voxels apart.
///
/// Samples outside the input are zero. Integer outputs are rounded and
/// clamped to the type range.
pub fn resample_linear<T: Pixel>(
    data: ArrayView3<T>,
    spacing: [f64; 3],
    target_size: [usize; 3],
    target_spacing: [f64; 3],
) -> Array3<T> {
    let (nz, ny, nx) = data.dim();
    let tx = taps(nx, target_size[0], target_spacing[0] / spacing[0]);
    let ty = taps(ny, target_size[1], target_spacing[1] / spacing[1]);
    let tz = taps(nz, target_size[2], target_spacing[2] / spacing[2]);

    let sample = |z: usize, y: usize, x: usize| data[[z, y, x]].to_f64().unwrap_or(0.0);

    Array3::from_shape_fn(
        (target_size[2], target_size[1], target_size[0]),
        |(k, j, i)| match (tz[k], ty[j], tx[i]) {
            (Some(z), Some(y), Some(x)) => {
                let mut value = 0.0;
                for (zi, wz) in [(z.lower, 1.0 - z.weight), (z.upper, z.weight)] {
                    for (yi, wy) in [(y.lower, 1.0 - y.weight), (y.upper, y.weight)] {
                        for (xi, wx) in [(x.lower, 1.0 - x.weight), (x.upper, x.weight)] {
                            let w = wz * wy * wx;
                            if w != 0.0 {
                                value += w * sample(zi, yi, xi);
                            }
                        }
                    }
                }
                cast_pixel(value)
            }
            _ => T::default(),
        },
    )
}

/// Resample level 0 data onto a pyramid level of `target_size` (x, y, z) voxels.
pub fn resample_to_level<T: Pixel>(
    data: ArrayView3<T>,
    spacing: [f64; 3],
    target_size: [usize; 3],
) -> Array3<T> {
    let (nz, ny, nx) = data.dim();
    let target_spacing = resampled_spacing([nx, ny, nz], spacing, target_size);
    resample_linear(data, spacing, target_size, target_spacing)
}

fn cast_pixel<T: Pixel>(value: f64) -> T {
    let value = if T::PIXEL_TYPE.is_float() {
        value
    } else {
        let lo = T::min_value().to_f64().unwrap_or(0.0);
        let hi = <T as Bounded>::max_value().to_f64().unwrap_or(f64::MAX);
        value.round().clamp(lo, hi)
    };
    <T as NumCast>::from(value).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;

    #[test]
    fn test_resampled_spacing() {
        let spacing = resampled_spacing([9, 5, 1], [1.0, 2.0, 3.0], [5, 3, 1]);
        assert_eq!(spacing, [2.0, 4.0, 1.0]);
    }

    #[test]
    fn test_identity_resample() {
        let data = Array3::from_shape_fn((2, 3, 4), |(z, y, x)| (z * 12 + y * 4 + x) as u8);
        let out = resample_to_level(data.view(), [0.5, 0.5, 2.0], [4, 3, 2]);
        assert_eq!(out, data);
    }

    #[test]
    fn test_downsample_keeps_corners() {
        let data = Array3::from_shape_fn((1, 1, 9), |(_, _, x)| (x * 10) as u16);
        let out = resample_to_level(data.view(), [1.0; 3], [5, 1, 1]);
        assert_eq!(out.into_raw_vec_and_offset().0, vec![0, 20, 40, 60, 80]);
    }

    #[test]
    fn test_interpolation_and_rounding() {
        let data = Array3::from_shape_vec((1, 1, 2), vec![0u8, 255]).unwrap();
        let out = resample_linear(data.view(), [1.0; 3], [3, 1, 1], [0.5, 1.0, 1.0]);
        assert_eq!(out.into_raw_vec_and_offset().0, vec![0, 128, 255]);

        let data = Array3::from_shape_vec((1, 1, 2), vec![0.0f32, 1.0]).unwrap();
        let out = resample_linear(data.view(), [1.0; 3], [3, 1, 1], [0.5, 1.0, 1.0]);
        assert_eq!(out[[0, 0, 1]], 0.5);
    }

    #[test]
    fn test_outside_is_zero() {
        let data = Array3::<u16>::from_elem((1, 1, 2), 9);
        let out = resample_linear(data.view(), [1.0; 3], [4, 1, 1], [1.0, 1.0, 1.0]);
        assert_eq!(out.into_raw_vec_and_offset().0, vec![9, 9, 0, 0]);
    }
}
