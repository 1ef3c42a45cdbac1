//! String attribute codec
//!
//! Imaris stores every attribute, numbers included, as a one dimensional array
//! of single byte, null terminated, fixed length strings. `"255.000"` is written
//! as seven `S1` elements with `H5T_STR_NULLTERM` padding. The reference
//! application does not read attributes encoded any other way, so all writes go
//! through [`write_str_attr`]. Text is stored as its UTF-8 bytes, one byte per
//! element, which keeps names like `"µm"` intact.

use crate::error::{ImsError, Result};
use hdf5::globals::H5T_C_S1;
use hdf5::types::{FixedAscii, FixedUnicode, TypeDescriptor, VarLenUnicode};
use hdf5::{h5check, Attribute, Dataset, Dataspace, Datatype, Location};
use hdf5_sys::h5::hsize_t;
use hdf5_sys::h5a::{H5Acreate2, H5Awrite};
use hdf5_sys::h5d::{H5Dcreate2, H5Dwrite};
use hdf5_sys::h5p::H5P_DEFAULT;
use hdf5_sys::h5s::{H5Screate_simple, H5S_ALL};
use hdf5_sys::h5t::{H5T_cset_t, H5T_str_t, H5Tcopy, H5Tset_cset, H5Tset_size, H5Tset_strpad};
use std::ffi::CString;
use std::ptr;
use std::str::FromStr;

/// One element of an Imaris string attribute, as read back.
pub type AsciiChar = FixedAscii<1>;

/// Split text into single byte string elements.
///
/// An empty value becomes one null element, the encoding the reference
/// application uses for blank names and descriptions.
pub fn encode_text(value: &str) -> Vec<u8> {
    if value.is_empty() {
        return vec![0];
    }
    value.as_bytes().to_vec()
}

/// Join string elements back into text, dropping null padding.
pub fn decode_ascii(elements: &[AsciiChar]) -> String {
    let bytes: Vec<u8> = elements
        .iter()
        .flat_map(|c| c.as_bytes().iter().copied())
        .filter(|&b| b != 0)
        .collect();
    String::from_utf8_lossy(&bytes).into_owned()
}

/// The `S1`, null terminated, ASCII tagged element type.
///
/// `hdf5::types` only builds null padded fixed strings, so the type is
/// assembled from `H5T_C_S1` directly.
pub fn text_char_type() -> Result<Datatype> {
    let dtype = hdf5::sync::sync(|| unsafe {
        let id = h5check(H5Tcopy(*H5T_C_S1))?;
        let dtype = hdf5::from_id::<Datatype>(id)?;
        h5check(H5Tset_size(id, 1))?;
        h5check(H5Tset_strpad(id, H5T_str_t::H5T_STR_NULLTERM))?;
        h5check(H5Tset_cset(id, H5T_cset_t::H5T_CSET_ASCII))?;
        Ok::<_, hdf5::Error>(dtype)
    })?;
    Ok(dtype)
}

fn text_space(len: usize) -> Result<Dataspace> {
    let dims = [len as hsize_t];
    let space = hdf5::sync::sync(|| unsafe {
        let id = h5check(H5Screate_simple(1, dims.as_ptr(), ptr::null()))?;
        hdf5::from_id::<Dataspace>(id)
    })?;
    Ok(space)
}

fn c_name(name: &str) -> Result<CString> {
    CString::new(name).map_err(|_| ImsError::InvalidValue(format!("name {name:?} contains a null byte")))
}

/// Check whether an attribute is attached to `loc`.
pub fn has_attr(loc: &Location, name: &str) -> Result<bool> {
    Ok(loc.attr_names()?.iter().any(|n| n == name))
}

/// Delete an attribute if present.
pub fn remove_attr(loc: &Location, name: &str) -> Result<()> {
    if has_attr(loc, name)? {
        loc.delete_attr(name)?;
    }
    Ok(())
}

/// Delete every attribute attached to `loc`.
pub fn clear_attrs(loc: &Location) -> Result<()> {
    for name in loc.attr_names()? {
        loc.delete_attr(&name)?;
    }
    Ok(())
}

/// Write (or replace) a string attribute.
///
/// Fixed length attributes cannot be resized, so an existing attribute is
/// deleted and created again with the new length.
pub fn write_str_attr(loc: &Location, name: &str, value: &str) -> Result<()> {
    let bytes = encode_text(value);
    remove_attr(loc, name)?;
    let dtype = text_char_type()?;
    let space = text_space(bytes.len())?;
    let name = c_name(name)?;
    hdf5::sync::sync(|| unsafe {
        let id = h5check(H5Acreate2(
            loc.id(),
            name.as_ptr(),
            dtype.id(),
            space.id(),
            H5P_DEFAULT,
            H5P_DEFAULT,
        ))?;
        let attr = hdf5::from_id::<Attribute>(id)?;
        h5check(H5Awrite(attr.id(), dtype.id(), bytes.as_ptr().cast()))?;
        Ok::<_, hdf5::Error>(())
    })?;
    Ok(())
}

/// Create a one dimensional text dataset with the attribute element type.
pub fn write_text_dataset(loc: &Location, name: &str, value: &str) -> Result<Dataset> {
    let bytes = encode_text(value);
    let dtype = text_char_type()?;
    let space = text_space(bytes.len())?;
    let name = c_name(name)?;
    let dataset = hdf5::sync::sync(|| unsafe {
        let id = h5check(H5Dcreate2(
            loc.id(),
            name.as_ptr(),
            dtype.id(),
            space.id(),
            H5P_DEFAULT,
            H5P_DEFAULT,
            H5P_DEFAULT,
        ))?;
        let dataset = hdf5::from_id::<Dataset>(id)?;
        h5check(H5Dwrite(
            dataset.id(),
            dtype.id(),
            H5S_ALL,
            H5S_ALL,
            H5P_DEFAULT,
            bytes.as_ptr().cast(),
        ))?;
        Ok::<_, hdf5::Error>(dataset)
    })?;
    Ok(dataset)
}

/// Read a string attribute, failing if it is missing.
pub fn read_str_attr(loc: &Location, name: &str) -> Result<String> {
    read_opt_str_attr(loc, name)?.ok_or_else(|| ImsError::MissingField(name.to_string()))
}

/// Read a string attribute if present.
pub fn read_opt_str_attr(loc: &Location, name: &str) -> Result<Option<String>> {
    if !has_attr(loc, name)? {
        return Ok(None);
    }
    let attr = loc.attr(name)?;
    let text = match attr.dtype()?.to_descriptor()? {
        TypeDescriptor::FixedAscii(1) => decode_ascii(&attr.read_raw::<AsciiChar>()?),
        TypeDescriptor::FixedUnicode(1) => {
            let elements = attr.read_raw::<FixedUnicode<1>>()?;
            elements.iter().map(|c| c.as_str()).collect()
        }
        TypeDescriptor::VarLenAscii | TypeDescriptor::VarLenUnicode => {
            let value: VarLenUnicode = attr.read_scalar()?;
            value.as_str().trim_end_matches('\0').to_string()
        }
        other => {
            return Err(ImsError::InvalidFormat(format!(
                "attribute {name} has unexpected type {other:?}"
            )))
        }
    };
    Ok(Some(text))
}

/// Read a string attribute and parse it.
pub fn read_parsed_attr<T: FromStr>(loc: &Location, name: &str) -> Result<T> {
    let text = read_str_attr(loc, name)?;
    text.trim().parse().map_err(|_| {
        ImsError::InvalidFormat(format!("attribute {name} has unparsable value {text:?}"))
    })
}

/// Parse whitespace and/or comma separated numbers.
pub fn parse_floats(text: &str) -> Result<Vec<f64>> {
    text.replace(',', " ")
        .split_whitespace()
        .map(|token| {
            token
                .parse::<f64>()
                .map_err(|_| ImsError::InvalidValue(format!("not a number: {token:?}")))
        })
        .collect()
}

/// Fixed three decimal place rendering used for all numeric settings.
pub fn format_float3(value: f64) -> String {
    format!("{value:.3}")
}

/// Render numbers as space separated three decimal place values.
pub fn join_float3(values: &[f64]) -> String {
    values
        .iter()
        .map(|v| format_float3(*v))
        .collect::<Vec<_>>()
        .join(" ")
}
