/* ************************************************************************ **
** This file is part of mlsys, and is licensed under EITHER the MIT license **
** or the Apache 2.0 license, at your option.                               **
**                                                                          **
**     http://www.apache.org/licenses/LICENSE-2.0                           **
**     http://opensource.org/licenses/MIT                                   **
** ************************************************************************ */

use crate::{Error, Result};
use crate::tensor::{DType, Device, Tensor};

use ::std::collections::BTreeMap;
use ::itertools::Itertools;

/// Named integer metadata for one axis of a [`TensorBlock`].
///
/// `values` is a 2-D `int32` tensor with one row per entry and one column
/// per name.
#[derive(Debug, Clone, PartialEq)]
pub struct Labels {
    names: Vec<String>,
    values: Tensor,
}

fn valid_label_name(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

impl Labels {
    pub fn new<S: Into<String>>(names: Vec<S>, values: Tensor) -> Result<Labels> {
        let names = names.into_iter().map(Into::into).collect::<Vec<String>>();
        for name in &names {
            if !valid_label_name(name) {
                throw!(Schema, "'{}' is not a valid label name", name);
            }
        }
        if names.iter().unique().count() != names.len() {
            throw!(Schema, "labels names must be unique, got [{}]", names.iter().join(", "));
        }

        if values.dim() != 2 {
            throw!(Shape, "labels values must be a 2 dimensional tensor, got {} dimensions", values.dim());
        }
        if values.size(1) != names.len() {
            throw!(Shape,
                "labels values have {} columns, but there are {} names",
                values.size(1), names.len(),
            );
        }
        if values.dtype() != DType::Int32 {
            throw!(Mismatch, "labels values must be {}, got {}", DType::Int32, values.dtype());
        }
        Ok(Labels { names, values })
    }

    /// Labels from row-major data.
    pub fn from_flat(names: &[&str], values: Vec<i32>) -> Result<Labels> {
        if names.is_empty() {
            throw!(Shape, "labels need at least one name");
        }
        let width = names.len();
        if values.len() % width != 0 {
            throw!(Shape, "{} values can not be split in rows of {}", values.len(), width);
        }
        let count = values.len() / width;
        Labels::new(names.to_vec(), Tensor::from_i32(values, &[count, width])?)
    }

    /// A single name, with entries `0..count`.
    pub fn range(name: &str, count: usize) -> Result<Labels> {
        Labels::from_flat(&[name], (0..count as i32).collect())
    }

    pub fn names(&self) -> &[String] { &self.names }
    pub fn values(&self) -> &Tensor { &self.values }
    pub fn count(&self) -> usize { self.values.size(0) }
    pub fn device(&self) -> Device { self.values.device() }

    pub fn to(&self, device: Device) -> Result<Labels> {
        Ok(Labels {
            names: self.names.clone(),
            values: self.values.to(None, Some(device))?,
        })
    }
}

/// Values with labeled samples, components and properties, plus optional
/// gradients with respect to named parameters.
///
/// The shape of `values` is `[samples, components..., properties]`.
#[derive(Debug, Clone, PartialEq)]
pub struct TensorBlock {
    values: Tensor,
    samples: Labels,
    components: Vec<Labels>,
    properties: Labels,
    gradients: BTreeMap<String, TensorBlock>,
}

impl TensorBlock {
    pub fn new(values: Tensor, samples: Labels, components: Vec<Labels>, properties: Labels) -> Result<TensorBlock> {
        let mut expected = vec![samples.count()];
        for component in &components {
            if component.names().len() != 1 {
                throw!(Schema,
                    "component labels must have a single dimension, got {}: [{}]",
                    component.names().len(), component.names().iter().join(", "),
                );
            }
            expected.push(component.count());
        }
        expected.push(properties.count());

        if values.shape() != &expected[..] {
            throw!(Shape,
                "values shape {:?} does not match the labels, expected {:?}",
                values.shape(), expected,
            );
        }

        let labels = Some(&samples).into_iter().chain(&components).chain(Some(&properties));
        for labels in labels {
            if labels.device() != values.device() {
                throw!(Mismatch,
                    "all labels must be on the same device as the values ({}), got {}",
                    values.device(), labels.device(),
                );
            }
        }

        Ok(TensorBlock { values, samples, components, properties, gradients: BTreeMap::new() })
    }

    pub fn values(&self) -> &Tensor { &self.values }
    pub fn samples(&self) -> &Labels { &self.samples }
    pub fn components(&self) -> &[Labels] { &self.components }
    pub fn properties(&self) -> &Labels { &self.properties }

    /// Attach the gradient of these values with respect to `parameter`.
    ///
    /// The gradient must share the properties and trailing components of this
    /// block, and live on the same device with the same dtype.
    pub fn add_gradient(&mut self, parameter: &str, gradient: TensorBlock) -> Result<()> {
        if self.gradients.contains_key(parameter) {
            throw!(Registry, "gradient with respect to '{}' already exists for this block", parameter);
        }
        if gradient.values.dtype() != self.values.dtype() || gradient.values.device() != self.values.device() {
            throw!(Mismatch,
                "gradient with respect to '{}' must have the same dtype and device as the values",
                parameter,
            );
        }
        if gradient.properties != self.properties {
            throw!(Schema, "gradient with respect to '{}' must have the same properties as the values", parameter);
        }
        let n_extra = gradient.components.len().checked_sub(self.components.len());
        let trailing_match = n_extra.map_or(false, |n| gradient.components[n..] == self.components[..]);
        if !trailing_match {
            throw!(Schema,
                "gradient with respect to '{}' must end with the same components as the values",
                parameter,
            );
        }
        self.gradients.insert(parameter.to_string(), gradient);
        Ok(())
    }

    pub fn gradient(&self, parameter: &str) -> Option<&TensorBlock> { self.gradients.get(parameter) }

    pub fn gradients_list(&self) -> Vec<&str> { self.gradients.keys().map(|s| &s[..]).collect() }

    /// Cast the values (and those of the gradients) to `dtype`, and move
    /// everything to `device`.
    pub fn to(&self, dtype: Option<DType>, device: Option<Device>) -> Result<TensorBlock> {
        let values = self.values.to(dtype, device)?;
        let device = values.device();
        let mut gradients = BTreeMap::new();
        for (parameter, gradient) in &self.gradients {
            gradients.insert(parameter.clone(), gradient.to(dtype, Some(device))?);
        }
        Ok(TensorBlock {
            values,
            samples: self.samples.to(device)?,
            components: self.components.iter().map(|c| c.to(device)).collect::<Result<_>>()?,
            properties: self.properties.to(device)?,
            gradients,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(n: usize) -> TensorBlock {
        TensorBlock::new(
            Tensor::from_f64(vec![0.0; n * 3], &[n, 3, 1]).unwrap(),
            Labels::range("sample", n).unwrap(),
            vec![Labels::range("xyz", 3).unwrap()],
            Labels::range("property", 1).unwrap(),
        ).unwrap()
    }

    #[test]
    fn labels_validation() {
        assert!(Labels::from_flat(&["a", "b"], vec![0, 1, 2, 3]).is_ok());
        assert!(Labels::from_flat(&["a", "b"], vec![0, 1, 2]).is_err());
        assert!(Labels::from_flat(&["a", "a"], vec![0, 1]).is_err());
        assert!(Labels::from_flat(&["not valid"], vec![0]).is_err());

        let wrong_dtype = Tensor::from_i64(vec![0, 1], &[2, 1]).unwrap();
        match Labels::new(vec!["a"], wrong_dtype) {
            Err(Error::Mismatch(_)) => {},
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn block_shape_is_checked() {
        let values = Tensor::from_f64(vec![0.0; 6], &[2, 3]).unwrap();
        let result = TensorBlock::new(
            values,
            Labels::range("sample", 3).unwrap(),
            vec![],
            Labels::range("property", 2).unwrap(),
        );
        match result {
            Err(Error::Shape(message)) => assert!(message.contains("[2, 3]")),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn gradients() {
        let mut values = block(2);
        let gradient = TensorBlock::new(
            Tensor::from_f64(vec![0.0; 2 * 3 * 3], &[2, 3, 3, 1]).unwrap(),
            Labels::range("sample", 2).unwrap(),
            vec![Labels::range("direction", 3).unwrap(), Labels::range("xyz", 3).unwrap()],
            Labels::range("property", 1).unwrap(),
        ).unwrap();
        values.add_gradient("positions", gradient.clone()).unwrap();
        assert_eq!(values.gradients_list(), vec!["positions"]);
        assert!(values.add_gradient("positions", gradient).is_err());

        let moved = values.to(Some(DType::Float32), Some(Device::Cuda(0))).unwrap();
        let moved_gradient = moved.gradient("positions").unwrap();
        assert_eq!(moved_gradient.values().dtype(), DType::Float32);
        assert_eq!(moved_gradient.samples().device(), Device::Cuda(0));
        assert_eq!(moved.samples().values().dtype(), DType::Int32);
    }
}
