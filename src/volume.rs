//! In-memory multi-channel volumes
//!
//! A [`Volume`] holds the voxels of one or more channels of a single timepoint
//! as a `(channel, z, y, x)` array together with its physical placement and a
//! set of string annotations (unit, time, channel settings) that travel with
//! the pixels between a read and a later write.

use crate::channels_xml::{channels_from_xml, channels_to_xml, CHANNELS_METADATA_KEY};
use crate::error::{ImsError, Result};
use crate::settings::ChannelSettings;
use crate::types::{ComponentLayout, Geometry, Pixel, PixelType};
use ndarray::{stack, Array3, Array4, ArrayView3, ArrayView4, Axis};
use std::collections::BTreeMap;

/// Annotation key holding the physical unit of origin and spacing.
pub const UNIT_METADATA_KEY: &str = "unit";

/// Annotation key holding the date-time of the timepoint a volume was read from.
pub const TIME_METADATA_KEY: &str = "times";

/// Row-major identity direction cosine matrix.
pub const IDENTITY_DIRECTION: [f64; 9] = [1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0];

/// Voxel storage of a volume, `(channel, z, y, x)`
#[derive(Debug, Clone, PartialEq)]
pub enum PixelData {
    U8(Array4<u8>),
    U16(Array4<u16>),
    U32(Array4<u32>),
    F32(Array4<f32>),
}

/// Run `$body` with `$array` bound to the typed array inside a [`PixelData`].
macro_rules! dispatch_pixel_data {
    ($data:expr, $array:ident => $body:expr) => {
        match $data {
            $crate::volume::PixelData::U8($array) => $body,
            $crate::volume::PixelData::U16($array) => $body,
            $crate::volume::PixelData::U32($array) => $body,
            $crate::volume::PixelData::F32($array) => $body,
        }
    };
}
pub(crate) use dispatch_pixel_data;

impl PixelData {
    pub fn pixel_type(&self) -> PixelType {
        match self {
            PixelData::U8(_) => PixelType::U8,
            PixelData::U16(_) => PixelType::U16,
            PixelData::U32(_) => PixelType::U32,
            PixelData::F32(_) => PixelType::F32,
        }
    }

    /// `(channels, z, y, x)`
    pub fn dim(&self) -> (usize, usize, usize, usize) {
        dispatch_pixel_data!(self, array => array.dim())
    }

    /// Zero-filled storage.
    pub fn zeros(pixel_type: PixelType, shape: (usize, usize, usize, usize)) -> Self {
        match pixel_type {
            PixelType::U8 => PixelData::U8(Array4::zeros(shape)),
            PixelType::U16 => PixelData::U16(Array4::zeros(shape)),
            PixelType::U32 => PixelData::U32(Array4::zeros(shape)),
            PixelType::F32 => PixelData::F32(Array4::zeros(shape)),
        }
    }
}

/// A single-timepoint volume with one or more channels.
#[derive(Debug, Clone, PartialEq)]
pub struct Volume {
    data: PixelData,
    layout: ComponentLayout,
    geometry: Geometry,
    direction: [f64; 9],
    metadata: BTreeMap<String, String>,
}

impl Volume {
    /// Wrap channel-major storage with unit spacing at the origin.
    pub fn new(data: PixelData) -> Self {
        Self {
            data,
            layout: ComponentLayout::default(),
            geometry: Geometry::default(),
            direction: IDENTITY_DIRECTION,
            metadata: BTreeMap::new(),
        }
    }

    pub fn from_array<T: Pixel>(array: Array4<T>) -> Self {
        Self::new(T::into_data(array))
    }

    /// Stack equally sized `(z, y, x)` channel arrays into one volume.
    pub fn from_channels<T: Pixel>(channels: &[Array3<T>]) -> Result<Self> {
        if channels.is_empty() {
            return Err(ImsError::InvalidValue(
                "a volume needs at least one channel".to_string(),
            ));
        }
        let views: Vec<ArrayView3<T>> = channels.iter().map(|c| c.view()).collect();
        let array = stack(Axis(0), &views).map_err(|e| {
            ImsError::InvalidValue(format!("channel arrays differ in shape: {e}"))
        })?;
        Ok(Self::from_array(array))
    }

    /// Zero-filled volume of `channels` channels and `size` (x, y, z) voxels.
    pub fn zeros(pixel_type: PixelType, channels: usize, size: [usize; 3]) -> Self {
        Self::new(PixelData::zeros(
            pixel_type,
            (channels, size[2], size[1], size[0]),
        ))
    }

    pub fn with_layout(mut self, layout: ComponentLayout) -> Self {
        self.layout = layout;
        self
    }

    pub fn with_geometry(mut self, geometry: Geometry) -> Self {
        self.geometry = geometry;
        self
    }

    pub fn with_direction(mut self, direction: [f64; 9]) -> Self {
        self.direction = direction;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn data(&self) -> &PixelData {
        &self.data
    }

    pub fn into_data(self) -> PixelData {
        self.data
    }

    pub fn pixel_type(&self) -> PixelType {
        self.data.pixel_type()
    }

    pub fn layout(&self) -> ComponentLayout {
        self.layout
    }

    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    pub fn set_geometry(&mut self, geometry: Geometry) {
        self.geometry = geometry;
    }

    pub fn direction(&self) -> &[f64; 9] {
        &self.direction
    }

    pub fn num_channels(&self) -> usize {
        self.data.dim().0
    }

    /// Voxel dimensions in x, y, z order.
    pub fn size(&self) -> [usize; 3] {
        let (_, z, y, x) = self.data.dim();
        [x, y, z]
    }

    /// Image dimension as seen by consumers: vector volumes and single
    /// channel volumes are 3D, multi-channel scalar volumes gain a fourth axis.
    pub fn dimension(&self) -> usize {
        match self.layout {
            ComponentLayout::ChannelAxis if self.num_channels() > 1 => 4,
            _ => 3,
        }
    }

    /// Whether the direction cosines are the identity within
    /// `1e-8 + 1e-5 * |identity|` per element.
    pub fn has_identity_direction(&self) -> bool {
        self.direction
            .iter()
            .zip(IDENTITY_DIRECTION.iter())
            .all(|(d, i)| (d - i).abs() <= 1.0e-8 + 1.0e-5 * i.abs())
    }

    /// Typed view of one channel as `(z, y, x)`.
    pub fn channel<T: Pixel>(&self, index: usize) -> Option<ArrayView3<'_, T>> {
        let array = T::from_data(&self.data)?;
        if index >= array.dim().0 {
            return None;
        }
        Some(array.index_axis(Axis(0), index))
    }

    /// Typed view of all voxels in the order of the component layout:
    /// `(z, y, x, component)` for vector volumes, `(channel, z, y, x)` otherwise.
    pub fn view<T: Pixel>(&self) -> Option<ArrayView4<'_, T>> {
        let array = T::from_data(&self.data)?.view();
        Some(match self.layout {
            ComponentLayout::Vector => array.permuted_axes([1, 2, 3, 0]),
            ComponentLayout::ChannelAxis => array,
        })
    }

    pub fn metadata(&self) -> &BTreeMap<String, String> {
        &self.metadata
    }

    pub fn metadata_value(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }

    pub fn set_metadata(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.metadata.insert(key.into(), value.into());
    }

    pub fn unit(&self) -> Option<&str> {
        self.metadata_value(UNIT_METADATA_KEY)
    }

    pub fn time(&self) -> Option<&str> {
        self.metadata_value(TIME_METADATA_KEY)
    }

    /// Channel settings carried by the volume's annotation, if any.
    pub fn channel_settings(&self) -> Result<Option<Vec<(usize, ChannelSettings)>>> {
        self.metadata_value(CHANNELS_METADATA_KEY)
            .map(channels_from_xml)
            .transpose()
    }

    /// Attach channel settings as an annotation.
    pub fn set_channel_settings(&mut self, channels: &[(usize, ChannelSettings)]) -> Result<()> {
        let xml = channels_to_xml(channels)?;
        self.set_metadata(CHANNELS_METADATA_KEY, xml);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;

    fn ramp(offset: u16) -> Array3<u16> {
        Array3::from_shape_fn((2, 3, 4), |(z, y, x)| offset + (z * 100 + y * 10 + x) as u16)
    }

    #[test]
    fn test_from_channels() {
        let volume = Volume::from_channels(&[ramp(0), ramp(1000)]).unwrap();
        assert_eq!(volume.pixel_type(), PixelType::U16);
        assert_eq!(volume.num_channels(), 2);
        assert_eq!(volume.size(), [4, 3, 2]);
        assert_eq!(volume.dimension(), 4);
        assert_eq!(volume.channel::<u16>(1).unwrap()[[1, 2, 3]], 1123);
        assert!(volume.channel::<u8>(0).is_none());
        assert!(volume.channel::<u16>(2).is_none());
    }

    #[test]
    fn test_mismatched_channels_rejected() {
        let other = Array3::<u16>::zeros((1, 3, 4));
        assert!(Volume::from_channels(&[ramp(0), other]).is_err());
        assert!(Volume::from_channels::<u8>(&[]).is_err());
    }

    #[test]
    fn test_layout_views_agree() {
        let planar = Volume::from_channels(&[ramp(0), ramp(1000)]).unwrap();
        let vector = planar.clone().with_layout(ComponentLayout::Vector);
        assert_eq!(vector.dimension(), 3);
        let p = planar.view::<u16>().unwrap();
        let v = vector.view::<u16>().unwrap();
        assert_eq!(v.dim(), (2, 3, 4, 2));
        for ((c, z, y, x), value) in p.indexed_iter() {
            assert_eq!(v[[z, y, x, c]], *value);
        }
    }

    #[test]
    fn test_direction_check() {
        let volume = Volume::zeros(PixelType::U8, 1, [2, 2, 2]);
        assert!(volume.has_identity_direction());
        let nearly = volume.clone().with_direction([1.0, 1e-9, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0]);
        assert!(nearly.has_identity_direction());
        let rotated = volume.with_direction([0.0, 1.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0]);
        assert!(!rotated.has_identity_direction());
    }

    #[test]
    fn test_channel_settings_annotation() {
        let mut volume = Volume::zeros(PixelType::F32, 2, [1, 1, 1]);
        assert!(volume.channel_settings().unwrap().is_none());
        let settings = vec![
            (0, ChannelSettings::defaults(0)),
            (1, ChannelSettings::defaults(1).with_name("GFP")),
        ];
        volume.set_channel_settings(&settings).unwrap();
        let decoded = volume.channel_settings().unwrap().unwrap();
        assert_eq!(decoded.len(), 2);
        assert_eq!(decoded[1].1.name.as_deref(), Some("GFP"));
    }
}
