/* ************************************************************************ **
** This file is part of mlsys, and is licensed under EITHER the MIT license **
** or the Apache 2.0 license, at your option.                               **
**                                                                          **
**     http://www.apache.org/licenses/LICENSE-2.0                           **
**     http://opensource.org/licenses/MIT                                   **
** ************************************************************************ */

//! JSON documents for systems and neighbor list options.
//!
//! Tensors are stored as `{"dtype": ..., "sizes": [...], "values": [...]}`
//! with row-major values. Cutoffs are stored as the bit pattern of the
//! `f64`, reinterpreted as an `i64`. Documents are written with an indent of
//! four spaces, and only contain ASCII characters.

use crate::{Error, Result, NeighborListOptions, TensorBlock, System};
use crate::neighbors::neighbor_list_block;
use crate::tensor::{DType, Tensor};

use ::std::convert::TryFrom;
use ::std::io;
use ::serde::Serialize;
use ::serde_json::{Map, Value};
use ::serde_json::ser::{Formatter, PrettyFormatter, Serializer};

fn format_error(message: impl Into<String>) -> Error {
    Error::Format(message.into())
}

/// Look up a required key of a JSON object.
fn field<'a>(object: &'a Map<String, Value>, key: &str, context: &str) -> Result<&'a Value> {
    object.get(key).ok_or_else(|| {
        format_error(format!("expected '{}' in JSON for {}, did not find it", key, context))
    })
}

/// Check the `class` of a JSON document, and get the document as an object.
fn class_object<'a>(data: &'a Value, class: &str) -> Result<&'a Map<String, Value>> {
    let object = match data.as_object() {
        Some(object) => object,
        None => return Err(format_error(format!("invalid JSON data for {}, expected an object", class))),
    };
    match object.get("class").and_then(Value::as_str) {
        Some(name) if name == class => Ok(object),
        Some(_) => Err(format_error(format!("'class' in JSON for {0} must be '{0}'", class))),
        None => Err(format_error(format!("expected 'class' in JSON for {}, did not find it", class))),
    }
}

// ==========================================================================
// Tensors

pub(crate) fn tensor_to_json(tensor: &Tensor) -> Result<Value> {
    let values = match tensor.dtype() {
        DType::Bool => return Err(format_error("boolean tensors can not be stored in JSON, convert them to integers first")),
        dtype if dtype.is_floating_point() => {
            // non finite values become null
            tensor.to_f64_vec()?.into_iter().map(Value::from).collect()
        },
        _ => tensor.to_i64_vec()?.into_iter().map(Value::from).collect(),
    };

    let mut object = Map::new();
    object.insert("dtype".into(), Value::from(tensor.dtype().name()));
    object.insert("sizes".into(), Value::from(tensor.shape().to_vec()));
    object.insert("values".into(), Value::Array(values));
    Ok(Value::Object(object))
}

pub(crate) fn tensor_from_json(data: &Value) -> Result<Tensor> {
    let object = match data.as_object() {
        Some(object) => object,
        None => return Err(format_error("invalid JSON data for tensor, expected an object")),
    };

    let dtype = match object.get("dtype").and_then(Value::as_str) {
        Some(name) => name.parse::<DType>()?,
        None => return Err(format_error("expected 'dtype' in JSON for tensor, did not find it")),
    };

    let sizes = field(object, "sizes", "tensor")?.as_array()
        .and_then(|sizes| {
            sizes.iter()
                .map(|s| s.as_u64().and_then(|s| usize::try_from(s).ok()))
                .collect::<Option<Vec<_>>>()
        })
        .ok_or_else(|| format_error("'sizes' in JSON for tensor must be an array of positive integers"))?;

    let values = match field(object, "values", "tensor")?.as_array() {
        Some(values) => values,
        None => return Err(format_error("'values' in JSON for tensor must be an array")),
    };

    let expected = sizes.iter().try_fold(1usize, |count, &size| count.checked_mul(size));
    match expected {
        Some(expected) if expected == values.len() => {},
        Some(expected) => {
            throw!(Format, "'values' in JSON for tensor must contain {} elements, got {}", expected, values.len());
        },
        None => {
            throw!(Format, "'sizes' in JSON for tensor {:?} overflow the number of elements", sizes);
        },
    }

    let tensor = if dtype.is_floating_point() {
        let values = values.iter().map(Value::as_f64).collect::<Option<Vec<_>>>()
            .ok_or_else(|| format_error(format!("'values' in JSON for a {} tensor must be numbers", dtype)))?;
        Tensor::from_floats(values, &sizes, dtype)?
    } else {
        let values = values.iter().map(Value::as_i64).collect::<Option<Vec<_>>>()
            .ok_or_else(|| format_error(format!("'values' in JSON for a {} tensor must be integers", dtype)))?;
        Tensor::from_ints(values, &sizes, dtype)?
    };
    Ok(tensor)
}

// ==========================================================================
// Writing documents

/// Pretty printing, with every non-ASCII character escaped.
struct AsciiFormatter<'a>(PrettyFormatter<'a>);

impl<'a> Formatter for AsciiFormatter<'a> {
    fn begin_array<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()>
    { self.0.begin_array(writer) }

    fn end_array<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()>
    { self.0.end_array(writer) }

    fn begin_array_value<W: ?Sized + io::Write>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    { self.0.begin_array_value(writer, first) }

    fn end_array_value<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()>
    { self.0.end_array_value(writer) }

    fn begin_object<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()>
    { self.0.begin_object(writer) }

    fn end_object<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()>
    { self.0.end_object(writer) }

    fn begin_object_key<W: ?Sized + io::Write>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    { self.0.begin_object_key(writer, first) }

    fn begin_object_value<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()>
    { self.0.begin_object_value(writer) }

    fn end_object_value<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()>
    { self.0.end_object_value(writer) }

    fn write_string_fragment<W: ?Sized + io::Write>(&mut self, writer: &mut W, fragment: &str) -> io::Result<()> {
        let mut units = [0u16; 2];
        for c in fragment.chars() {
            if c.is_ascii() {
                writer.write_all(&[c as u8])?;
            } else {
                for unit in c.encode_utf16(&mut units) {
                    write!(writer, "\\u{:04x}", unit)?;
                }
            }
        }
        Ok(())
    }
}

fn dump(value: &Value) -> Result<String> {
    let mut out = vec![];
    let formatter = AsciiFormatter(PrettyFormatter::with_indent(b"    "));
    value.serialize(&mut Serializer::with_formatter(&mut out, formatter))?;
    String::from_utf8(out).map_err(|_| format_error("serialized JSON is not valid UTF-8"))
}

// ==========================================================================
// Neighbor lists

fn options_to_json(options: &NeighborListOptions) -> Value {
    let mut object = Map::new();
    object.insert("class".into(), Value::from("NeighborListOptions"));
    object.insert("cutoff".into(), Value::from(options.cutoff().to_bits() as i64));
    object.insert("full_list".into(), Value::from(options.full_list()));
    object.insert("length_unit".into(), Value::from(options.length_unit()));
    Value::Object(object)
}

fn options_from_json(data: &Value) -> Result<NeighborListOptions> {
    let object = class_object(data, "NeighborListOptions")?;

    let cutoff = match object.get("cutoff").and_then(Value::as_i64) {
        Some(bits) => f64::from_bits(bits as u64),
        None => return Err(format_error("'cutoff' in JSON for NeighborListOptions must be a number")),
    };
    let full_list = match object.get("full_list").and_then(Value::as_bool) {
        Some(full_list) => full_list,
        None => return Err(format_error("'full_list' in JSON for NeighborListOptions must be a boolean")),
    };

    let mut options = NeighborListOptions::new(cutoff, full_list, "");
    if let Some(length_unit) = object.get("length_unit") {
        match length_unit.as_str() {
            Some(length_unit) => options.set_length_unit(length_unit)?,
            None => return Err(format_error("'length_unit' in JSON for NeighborListOptions must be a string")),
        }
    }
    Ok(options)
}

fn neighbors_to_json(neighbors: &TensorBlock) -> Result<Value> {
    let mut object = Map::new();
    object.insert("samples".into(), tensor_to_json(neighbors.samples().values())?);
    object.insert("values".into(), tensor_to_json(neighbors.values())?);
    Ok(Value::Object(object))
}

fn neighbors_from_json(data: &Map<String, Value>) -> Result<TensorBlock> {
    let samples = tensor_from_json(field(data, "samples", "neighbor list block")?)?;
    let values = tensor_from_json(field(data, "values", "neighbor list block")?)?;
    neighbor_list_block(samples, values)
}

impl NeighborListOptions {
    /// Serialize as JSON. Requestors are not part of the document.
    pub fn to_json(&self) -> Result<String> {
        dump(&options_to_json(self))
    }

    pub fn from_json(json: &str) -> Result<NeighborListOptions> {
        options_from_json(&::serde_json::from_str(json)?)
    }
}

// ==========================================================================
// Systems

impl System {
    /// Serialize the system and its neighbor lists as JSON.
    ///
    /// Custom data is not included.
    pub fn to_json(&self) -> Result<String> {
        let mut object = Map::new();
        object.insert("class".into(), Value::from("System"));
        object.insert("positions".into(), tensor_to_json(self.positions())?);
        object.insert("cell".into(), tensor_to_json(self.cell())?);
        object.insert("types".into(), tensor_to_json(self.types())?);
        object.insert("pbc".into(), tensor_to_json(&self.pbc().to(Some(DType::Int32), None)?)?);

        let mut neighbor_lists = vec![];
        for (options, neighbors) in self.neighbor_lists() {
            let mut entry = Map::new();
            entry.insert("options".into(), options_to_json(options));
            entry.insert("data".into(), neighbors_to_json(neighbors)?);
            neighbor_lists.push(Value::Object(entry));
        }
        object.insert("neighbor_lists".into(), Value::Array(neighbor_lists));

        dump(&Value::Object(object))
    }

    /// Read a system written by [`System::to_json`]. Everything ends up on
    /// the CPU.
    pub fn from_json(json: &str) -> Result<System> {
        let data = ::serde_json::from_str::<Value>(json)?;
        let object = class_object(&data, "System")?;

        let positions = tensor_from_json(field(object, "positions", "System")?)?;
        let cell = tensor_from_json(field(object, "cell", "System")?)?;
        let types = tensor_from_json(field(object, "types", "System")?)?;
        let pbc = tensor_from_json(field(object, "pbc", "System")?)?.to(Some(DType::Bool), None)?;

        let mut system = System::new(types, positions, cell, pbc)?;

        let neighbor_lists = match object.get("neighbor_lists") {
            None => return Ok(system),
            Some(Value::Array(neighbor_lists)) => neighbor_lists,
            Some(_) => return Err(format_error("'neighbor_lists' in JSON for System must be an array")),
        };
        for entry in neighbor_lists {
            let options = match entry.get("options") {
                Some(options) if options.is_object() => options_from_json(options)?,
                _ => return Err(format_error("expected 'options' in JSON for neighbor list, did not find it")),
            };
            let neighbors = match entry.get("data").and_then(Value::as_object) {
                Some(data) => neighbors_from_json(data)?,
                None => return Err(format_error("expected 'data' in JSON for neighbor list, did not find it")),
            };
            debug!("read {} neighbor pairs for {}", neighbors.values().size(0), options);
            system.add_neighbor_list(options, neighbors)?;
        }
        Ok(system)
    }
}
