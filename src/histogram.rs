//! Channel histograms
//!
//! Every channel block stores a 256-bin histogram over its observed value
//! range; pixel types wider than 8 bits also store a 1024-bin one.

use crate::attrs::{format_float3, write_str_attr};
use crate::error::Result;
use crate::types::Pixel;
use hdf5::Group;
use ndarray::ArrayView3;
use num_traits::ToPrimitive;
use serde::{Deserialize, Serialize};

pub const COARSE_BINS: usize = 256;
pub const FINE_BINS: usize = 1024;

/// Equal width histogram over [min, max]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Histogram {
    pub min: f64,
    pub max: f64,
    pub counts: Vec<u64>,
}

impl Histogram {
    /// Bin the finite values of `data` over their observed range.
    pub fn compute<T: Pixel>(data: ArrayView3<T>, bins: usize) -> Self {
        let (min, max) = value_range(data);
        Self::with_range(data, min, max, bins)
    }

    /// Bin the finite values of `data` over [min, max].
    ///
    /// A degenerate range is widened by half a unit on both sides; values equal
    /// to the upper edge fall into the last bin.
    pub fn with_range<T: Pixel>(data: ArrayView3<T>, min: f64, max: f64, bins: usize) -> Self {
        let mut counts = vec![0u64; bins];
        let (first, last) = if min == max {
            (min - 0.5, max + 0.5)
        } else {
            (min, max)
        };
        let width = last - first;
        let edge = |i: usize| first + width * i as f64 / bins as f64;

        for value in data.iter().filter_map(|v| v.to_f64()) {
            if !value.is_finite() || value < first || value > last {
                continue;
            }
            let mut index = ((value - first) / width * bins as f64) as usize;
            if index >= bins {
                index = bins - 1;
            }
            // Keep the bin consistent with the rounded bin edges.
            if index > 0 && value < edge(index) {
                index -= 1;
            } else if index + 1 < bins && value >= edge(index + 1) {
                index += 1;
            }
            counts[index] += 1;
        }

        Self { min, max, counts }
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }
}

/// Smallest and largest finite value, (0, 0) if there are none.
pub fn value_range<T: Pixel>(data: ArrayView3<T>) -> (f64, f64) {
    let mut range: Option<(f64, f64)> = None;
    for value in data.iter().filter_map(ToPrimitive::to_f64) {
        if !value.is_finite() {
            continue;
        }
        range = Some(match range {
            Some((lo, hi)) => (lo.min(value), hi.max(value)),
            None => (value, value),
        });
    }
    range.unwrap_or((0.0, 0.0))
}

/// Write the histogram attributes and datasets of one channel block.
pub fn write_histograms<T: Pixel>(group: &Group, data: ArrayView3<T>) -> Result<()> {
    let (min, max) = value_range(data);
    write_one(group, "", &Histogram::with_range(data, min, max, COARSE_BINS))?;
    if T::PIXEL_TYPE.has_fine_histogram() {
        write_one(group, "1024", &Histogram::with_range(data, min, max, FINE_BINS))?;
    }
    Ok(())
}

fn write_one(group: &Group, suffix: &str, histogram: &Histogram) -> Result<()> {
    write_str_attr(group, &format!("HistogramMin{suffix}"), &format_float3(histogram.min))?;
    write_str_attr(group, &format!("HistogramMax{suffix}"), &format_float3(histogram.max))?;
    let name = format!("Histogram{suffix}");
    if group.link_exists(&name) {
        group.unlink(&name)?;
    }
    group
        .new_dataset::<u64>()
        .shape(histogram.counts.len())
        .chunk((histogram.counts.len(),))
        .deflate(2)
        .create(name.as_str())?
        .write(histogram.counts.as_slice())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;

    #[test]
    fn test_value_range_and_bins() {
        let data = Array3::from_shape_vec((1, 1, 5), vec![0u8, 1, 2, 3, 4]).unwrap();
        let histogram = Histogram::compute(data.view(), 4);
        assert_eq!((histogram.min, histogram.max), (0.0, 4.0));
        // The maximum lands in the last bin.
        assert_eq!(histogram.counts, vec![1, 1, 1, 2]);
        assert_eq!(histogram.total(), 5);
    }

    #[test]
    fn test_constant_data_widens_range() {
        let data = Array3::<u16>::from_elem((2, 2, 2), 7);
        let histogram = Histogram::compute(data.view(), 256);
        assert_eq!((histogram.min, histogram.max), (7.0, 7.0));
        assert_eq!(histogram.counts[128], 8);
        assert_eq!(histogram.total(), 8);
    }

    #[test]
    fn test_non_finite_ignored() {
        let data = Array3::from_shape_vec((1, 1, 4), vec![1.0f32, f32::NAN, 3.0, f32::INFINITY])
            .unwrap();
        assert_eq!(value_range(data.view()), (1.0, 3.0));
        assert_eq!(Histogram::compute(data.view(), 2).counts, vec![1, 1]);
    }

    #[test]
    fn test_write_histograms() {
        let dir = tempfile::TempDir::new().unwrap();
        let file = hdf5::File::create(dir.path().join("hist.h5")).unwrap();
        let data = Array3::from_shape_fn((2, 4, 4), |(z, y, x)| (z * 16 + y * 4 + x) as u16);
        write_histograms(&file, data.view()).unwrap();

        let coarse = file.dataset("Histogram").unwrap().read_raw::<u64>().unwrap();
        assert_eq!(coarse.len(), COARSE_BINS);
        assert_eq!(coarse.iter().sum::<u64>(), 32);
        let fine = file.dataset("Histogram1024").unwrap().read_raw::<u64>().unwrap();
        assert_eq!(fine.len(), FINE_BINS);
        assert_eq!(
            crate::attrs::read_str_attr(&file, "HistogramMax1024").unwrap(),
            "31.000"
        );
    }
}
