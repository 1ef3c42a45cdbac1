//! XML text encoding of channel settings
//!
//! Volumes carry the settings of their channels as an XML string annotation so
//! that a volume read from one container can be written to another without
//! losing channel identity:
//!
//! ```xml
//! <imaris_channels_information>
//!   <channel>
//!     <name>DAPI</name>
//!     <description></description>
//!     <color>0, 0, 255</color>          <!-- or <color_table>, values in [0,255] -->
//!     <range>0.0, 255.0</range>
//!     <alpha>1.0</alpha>
//!     <gamma>1.0</gamma>                <!-- optional -->
//!   </channel>
//! </imaris_channels_information>
//! ```

use crate::attrs::parse_floats;
use crate::error::{ImsError, Result};
use crate::settings::{ChannelColor, ChannelSettings};
use quick_xml::escape::resolve_predefined_entity;
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

/// Annotation key under which the encoded settings are stored.
pub const CHANNELS_METADATA_KEY: &str = "imaris_channels_information";

const CHANNEL_TAG: &str = "channel";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Name,
    Description,
    Color,
    ColorTable,
    Range,
    Alpha,
    Gamma,
}

impl Field {
    fn from_tag(tag: &[u8]) -> Option<Self> {
        match tag {
            b"name" => Some(Field::Name),
            b"description" => Some(Field::Description),
            b"color" => Some(Field::Color),
            b"color_table" => Some(Field::ColorTable),
            b"range" => Some(Field::Range),
            b"alpha" => Some(Field::Alpha),
            b"gamma" => Some(Field::Gamma),
            _ => None,
        }
    }
}

/// Encode channel settings as XML. Channel indices are not encoded, order is.
pub fn channels_to_xml(channels: &[(usize, ChannelSettings)]) -> Result<String> {
    let mut xml = Writer::new(Vec::new());
    xml.write_event(Event::Start(BytesStart::new(CHANNELS_METADATA_KEY)))?;
    xml.write_event(Event::Comment(BytesText::new(concat!(
        "generated by ims-io ",
        env!("CARGO_PKG_VERSION")
    ))))?;

    for (_, settings) in channels {
        xml.write_event(Event::Start(BytesStart::new(CHANNEL_TAG)))?;
        write_element(&mut xml, "name", settings.name.as_deref().unwrap_or(""))?;
        write_element(
            &mut xml,
            "description",
            settings.description.as_deref().unwrap_or(""),
        )?;
        if let Some(color) = &settings.color {
            let tag = if color.is_table() { "color_table" } else { "color" };
            let text = color
                .components()
                .iter()
                .map(|c| ((c * 255.0 + 0.5) as i64).to_string())
                .collect::<Vec<_>>()
                .join(", ");
            write_element(&mut xml, tag, &text)?;
        }
        if let Some([min, max]) = settings.range {
            write_element(&mut xml, "range", &format!("{min:?}, {max:?}"))?;
        }
        if let Some(alpha) = settings.alpha {
            write_element(&mut xml, "alpha", &format!("{alpha:?}"))?;
        }
        if let Some(gamma) = settings.gamma {
            write_element(&mut xml, "gamma", &format!("{gamma:?}"))?;
        }
        xml.write_event(Event::End(BytesEnd::new(CHANNEL_TAG)))?;
    }

    xml.write_event(Event::End(BytesEnd::new(CHANNELS_METADATA_KEY)))?;
    String::from_utf8(xml.into_inner()).map_err(|e| ImsError::Xml(e.to_string()))
}

fn write_element(xml: &mut Writer<Vec<u8>>, tag: &str, text: &str) -> Result<()> {
    xml.write_event(Event::Start(BytesStart::new(tag)))?;
    if !text.is_empty() {
        xml.write_event(Event::Text(BytesText::new(text)))?;
    }
    xml.write_event(Event::End(BytesEnd::new(tag)))?;
    Ok(())
}

/// Decode channel settings from XML, numbering channels by their position.
///
/// Missing names and descriptions decode as empty strings.
pub fn channels_from_xml(text: &str) -> Result<Vec<(usize, ChannelSettings)>> {
    let mut xml = Reader::from_str(text);
    let mut channels = Vec::new();
    let mut current: Option<ChannelSettings> = None;
    let mut field: Option<Field> = None;
    let mut value = String::new();

    loop {
        match xml.read_event()? {
            Event::Start(e) => {
                let tag = e.name();
                if tag.as_ref() == CHANNEL_TAG.as_bytes() {
                    current = Some(ChannelSettings::default());
                } else if current.is_some() {
                    field = Field::from_tag(tag.as_ref());
                    value.clear();
                }
            }
            Event::Empty(e) => {
                if let (Some(settings), Some(f)) = (current.as_mut(), Field::from_tag(e.name().as_ref())) {
                    apply_field(settings, f, "")?;
                }
            }
            Event::Text(e) => {
                if field.is_some() {
                    value.push_str(&e.decode().map_err(|e| ImsError::Xml(e.to_string()))?);
                }
            }
            Event::GeneralRef(e) => {
                if field.is_some() {
                    if let Some(c) = e.resolve_char_ref()? {
                        value.push(c);
                    } else {
                        let name = e.decode().map_err(|e| ImsError::Xml(e.to_string()))?;
                        let resolved = resolve_predefined_entity(&name).ok_or_else(|| {
                            ImsError::Xml(format!("unknown entity &{name};"))
                        })?;
                        value.push_str(resolved);
                    }
                }
            }
            Event::End(e) => {
                if e.name().as_ref() == CHANNEL_TAG.as_bytes() {
                    if let Some(mut settings) = current.take() {
                        settings.name.get_or_insert_with(String::new);
                        settings.description.get_or_insert_with(String::new);
                        channels.push((channels.len(), settings));
                    }
                } else if let (Some(settings), Some(f)) = (current.as_mut(), field.take()) {
                    apply_field(settings, f, &value)?;
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(channels)
}

fn apply_field(settings: &mut ChannelSettings, field: Field, text: &str) -> Result<()> {
    match field {
        Field::Name => settings.name = Some(text.to_string()),
        Field::Description => settings.description = Some(text.to_string()),
        Field::Color | Field::ColorTable => {
            let values: Vec<f64> = parse_floats(text)?.iter().map(|v| v / 255.0).collect();
            let color = match field {
                Field::Color if values.len() == 3 => {
                    ChannelColor::Base([values[0], values[1], values[2]])
                }
                Field::ColorTable if !values.is_empty() && values.len() % 3 == 0 => {
                    ChannelColor::Table(values.chunks_exact(3).map(|c| [c[0], c[1], c[2]]).collect())
                }
                _ => {
                    return Err(ImsError::InvalidValue(format!(
                        "malformed channel color {text:?}"
                    )))
                }
            };
            settings.color = Some(color);
        }
        Field::Range => {
            let values = parse_floats(text)?;
            if values.len() != 2 {
                return Err(ImsError::InvalidValue(format!(
                    "channel range needs two values, got {text:?}"
                )));
            }
            settings.range = Some([values[0], values[1]]);
        }
        Field::Alpha => settings.alpha = Some(parse_scalar(text)?),
        Field::Gamma => settings.gamma = Some(parse_scalar(text)?),
    }
    Ok(())
}

fn parse_scalar(text: &str) -> Result<f64> {
    text.trim()
        .parse()
        .map_err(|_| ImsError::InvalidValue(format!("not a number: {text:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<(usize, ChannelSettings)> {
        vec![
            (
                0,
                ChannelSettings::defaults(0)
                    .with_name("Nuclei & membranes")
                    .with_range(12.5, 200.0),
            ),
            (
                1,
                ChannelSettings {
                    name: Some("Table".into()),
                    description: Some(String::new()),
                    color: Some(ChannelColor::Table(vec![[0.0, 0.0, 0.0], [1.0, 1.0, 1.0]])),
                    alpha: Some(0.5),
                    range: Some([0.0, 4095.0]),
                    gamma: None,
                },
            ),
        ]
    }

    #[test]
    fn test_xml_roundtrip() {
        let xml = channels_to_xml(&sample()).unwrap();
        assert!(xml.starts_with("<imaris_channels_information>"));
        assert!(xml.contains("<color>255, 0, 0</color>"));
        assert!(xml.contains("<color_table>0, 0, 0, 255, 255, 255</color_table>"));
        assert!(xml.contains("&amp;"));

        let decoded = channels_from_xml(&xml).unwrap();
        assert_eq!(decoded, sample());
    }

    #[test]
    fn test_colors_quantized_to_bytes() {
        let settings = ChannelSettings::defaults(0).with_color(ChannelColor::Base([0.3, 0.0, 1.0]));
        let xml = channels_to_xml(&[(0, settings)]).unwrap();
        assert!(xml.contains("<color>77, 0, 255</color>"));
        let decoded = channels_from_xml(&xml).unwrap();
        assert_eq!(
            decoded[0].1.color,
            Some(ChannelColor::Base([77.0 / 255.0, 0.0, 1.0]))
        );
    }

    #[test]
    fn test_missing_name_is_empty() {
        let xml = "<imaris_channels_information><channel><name/><range>0, 1</range>\
                   <alpha>1</alpha></channel></imaris_channels_information>";
        let decoded = channels_from_xml(xml).unwrap();
        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded[0].1.name.as_deref(), Some(""));
        assert_eq!(decoded[0].1.description.as_deref(), Some(""));
        assert_eq!(decoded[0].1.gamma, None);
    }

    #[test]
    fn test_malformed_range_rejected() {
        let xml = "<imaris_channels_information><channel><range>1 2 3</range></channel>\
                   </imaris_channels_information>";
        assert!(matches!(
            channels_from_xml(xml),
            Err(ImsError::InvalidValue(_))
        ));
    }
}
