/* ************************************************************************ **
** This file is part of mlsys, and is licensed under EITHER the MIT license **
** or the Apache 2.0 license, at your option.                               **
**                                                                          **
**     http://www.apache.org/licenses/LICENSE-2.0                           **
**     http://opensource.org/licenses/MIT                                   **
** ************************************************************************ */

use crate::{DType, Device, TensorError, Result};
use crate::autograd::{self, Node};
use crate::ops;

use ::std::fmt;
use ::std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use ::slice_of_array::prelude::*;

/// Flat row-major payload.
///
/// Every integral dtype (bool included) is held as `i64`, and both floating
/// dtypes as `f64`. A `Float32` tensor only ever holds values that are exactly
/// representable as `f32`.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Storage {
    Int(Vec<i64>),
    Float(Vec<f64>),
    Meta,
}

#[derive(Default)]
pub(crate) struct AutogradMeta {
    pub(crate) requires_grad: bool,
    pub(crate) grad_fn: Option<Arc<Node>>,
    pub(crate) grad: Option<Tensor>,
}

struct TensorImpl {
    shape: Vec<usize>,
    dtype: DType,
    device: Device,
    storage: Arc<Storage>,
    autograd: RwLock<AutogradMeta>,
}

/// A shared handle to a dense tensor.
///
/// Cloning the handle does not copy anything; both clones see the same data
/// and the same autograd state (this is what allows a tensor stored inside a
/// [`TensorBlock`] to be attached to a graph after the fact).
///
/// Data itself is immutable. Operations that change values, dtype, or device
/// produce new tensors.
///
/// [`TensorBlock`]: ../mlsys_system/struct.TensorBlock.html
#[derive(Clone)]
pub struct Tensor(Arc<TensorImpl>);

fn check_len(shape: &[usize], actual: usize) -> Result<()> {
    let expected = match shape.iter().try_fold(1usize, |count, &size| count.checked_mul(size)) {
        Some(expected) => expected,
        None => return Err(TensorError::ShapeOverflow(shape.to_vec())),
    };
    if expected != actual {
        return Err(TensorError::DataLength { shape: shape.to_vec(), expected, actual });
    }
    Ok(())
}

/// Constructors
impl Tensor {
    fn from_storage(storage: Arc<Storage>, shape: Vec<usize>, dtype: DType, device: Device) -> Tensor {
        Tensor(Arc::new(TensorImpl {
            shape, dtype, device, storage,
            autograd: RwLock::new(AutogradMeta::default()),
        }))
    }

    /// Build a CPU tensor of a floating point `dtype`.
    ///
    /// Values are rounded to the precision of `dtype`.
    pub fn from_floats(values: Vec<f64>, shape: &[usize], dtype: DType) -> Result<Tensor> {
        if !dtype.is_floating_point() {
            return Err(TensorError::WrongPayload { dtype, what: "floating point" });
        }
        check_len(shape, values.len())?;
        let values = values.into_iter().map(|x| dtype.round_float(x)).collect();
        Ok(Tensor::from_storage(Arc::new(Storage::Float(values)), shape.to_vec(), dtype, Device::Cpu))
    }

    /// Build a CPU tensor of an integral (or boolean) `dtype`.
    ///
    /// Values outside of the range of `dtype` wrap around.
    pub fn from_ints(values: Vec<i64>, shape: &[usize], dtype: DType) -> Result<Tensor> {
        if dtype.is_floating_point() {
            return Err(TensorError::WrongPayload { dtype, what: "integer" });
        }
        check_len(shape, values.len())?;
        let values = values.into_iter().map(|x| dtype.wrap_int(x)).collect();
        Ok(Tensor::from_storage(Arc::new(Storage::Int(values)), shape.to_vec(), dtype, Device::Cpu))
    }

    pub fn from_f64(values: Vec<f64>, shape: &[usize]) -> Result<Tensor>
    { Tensor::from_floats(values, shape, DType::Float64) }

    pub fn from_f32(values: Vec<f32>, shape: &[usize]) -> Result<Tensor>
    { Tensor::from_floats(values.into_iter().map(f64::from).collect(), shape, DType::Float32) }

    pub fn from_i64(values: Vec<i64>, shape: &[usize]) -> Result<Tensor>
    { Tensor::from_ints(values, shape, DType::Int64) }

    pub fn from_i32(values: Vec<i32>, shape: &[usize]) -> Result<Tensor>
    { Tensor::from_ints(values.into_iter().map(i64::from).collect(), shape, DType::Int32) }

    pub fn from_bools(values: Vec<bool>, shape: &[usize]) -> Result<Tensor>
    { Tensor::from_ints(values.into_iter().map(i64::from).collect(), shape, DType::Bool) }

    /// A `float64` tensor of shape `[rows.len(), 3]`.
    pub fn from_rows(rows: &[[f64; 3]]) -> Tensor {
        let storage = Storage::Float(rows.flat().to_vec());
        Tensor::from_storage(Arc::new(storage), vec![rows.len(), 3], DType::Float64, Device::Cpu)
    }

    /// Tensor with every element set to `value`.
    pub fn full(shape: &[usize], value: f64, dtype: DType, device: Device) -> Tensor {
        let len = shape.iter().product();
        let storage = match (device, dtype.is_floating_point()) {
            (Device::Meta, _) => Storage::Meta,
            (_, true) => Storage::Float(vec![dtype.round_float(value); len]),
            (_, false) => Storage::Int(vec![dtype.wrap_int(value as i64); len]),
        };
        Tensor::from_storage(Arc::new(storage), shape.to_vec(), dtype, device)
    }

    pub fn zeros(shape: &[usize], dtype: DType, device: Device) -> Tensor
    { Tensor::full(shape, 0.0, dtype, device) }

    /// A tensor on the meta device: shape and dtype, but no data.
    pub fn meta(shape: &[usize], dtype: DType) -> Tensor
    { Tensor::full(shape, 0.0, dtype, Device::Meta) }
}

/// Metadata
impl Tensor {
    pub fn shape(&self) -> &[usize] { &self.0.shape }
    pub fn dim(&self) -> usize { self.0.shape.len() }
    pub fn numel(&self) -> usize { self.0.shape.iter().product() }
    pub fn dtype(&self) -> DType { self.0.dtype }
    pub fn device(&self) -> Device { self.0.device }
    pub fn is_floating_point(&self) -> bool { self.0.dtype.is_floating_point() }

    /// Extent along one axis.
    ///
    /// # Panics
    /// Panics if `axis >= self.dim()`.
    pub fn size(&self, axis: usize) -> usize { self.0.shape[axis] }

    /// Test if two handles refer to the same tensor.
    pub fn same_as(&self, other: &Tensor) -> bool { Arc::ptr_eq(&self.0, &other.0) }

    /// Test if two tensors share their data buffer.
    pub fn shares_storage(&self, other: &Tensor) -> bool
    { Arc::ptr_eq(&self.0.storage, &other.0.storage) }

    pub(crate) fn storage(&self) -> &Storage { &self.0.storage }
}

/// Reading data
impl Tensor {
    pub fn to_f64_vec(&self) -> Result<Vec<f64>> {
        match self.storage() {
            Storage::Float(data) => Ok(data.clone()),
            Storage::Int(data) => Ok(data.iter().map(|&x| x as f64).collect()),
            Storage::Meta => Err(TensorError::MetaData("to_f64_vec")),
        }
    }

    /// Floating point data is truncated toward zero.
    pub fn to_i64_vec(&self) -> Result<Vec<i64>> {
        match self.storage() {
            Storage::Float(data) => Ok(data.iter().map(|&x| x as i64).collect()),
            Storage::Int(data) => Ok(data.clone()),
            Storage::Meta => Err(TensorError::MetaData("to_i64_vec")),
        }
    }

    pub fn to_bool_vec(&self) -> Result<Vec<bool>> {
        match self.storage() {
            Storage::Float(data) => Ok(data.iter().map(|&x| x != 0.0).collect()),
            Storage::Int(data) => Ok(data.iter().map(|&x| x != 0).collect()),
            Storage::Meta => Err(TensorError::MetaData("to_bool_vec")),
        }
    }

    /// The value of a single-element tensor.
    pub fn item(&self) -> Result<f64> {
        if self.numel() != 1 {
            return Err(TensorError::ShapeMismatch(self.shape().to_vec(), vec![]));
        }
        Ok(self.to_f64_vec()?[0])
    }

    /// Compare shape, dtype, device, and the exact bit patterns of the data.
    ///
    /// Unlike `==`, this considers a NaN equal to itself and `0.0` different
    /// from `-0.0`.
    pub fn bit_eq(&self, other: &Tensor) -> bool {
        if self.shape() != other.shape() || self.dtype() != other.dtype() || self.device() != other.device() {
            return false;
        }
        match (self.storage(), other.storage()) {
            (Storage::Float(a), Storage::Float(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(a, b)| a.to_bits() == b.to_bits())
            },
            (Storage::Int(a), Storage::Int(b)) => a == b,
            (Storage::Meta, Storage::Meta) => true,
            _ => false,
        }
    }
}

/// Conversions
impl Tensor {
    /// Cast to another dtype and/or move to another device.
    ///
    /// When nothing changes, this returns a handle to `self`. When only the
    /// device changes, the result shares its data buffer with `self`.
    ///
    /// Unlike [`DType::can_cast`], any dtype can be converted to any other
    /// here. The conversion is differentiable for floating point targets.
    pub fn to(&self, dtype: Option<DType>, device: Option<Device>) -> Result<Tensor> {
        let dtype = dtype.unwrap_or(self.dtype());
        let device = device.unwrap_or(self.device());
        if dtype == self.dtype() && device == self.device() {
            return Ok(self.clone());
        }

        if self.requires_grad() && dtype.is_floating_point() {
            return autograd::apply::<ops::ToCopy>((self.clone(), dtype, device));
        }
        self.convert(dtype, device)
    }

    /// [`Tensor::to`] without any autograd bookkeeping.
    pub(crate) fn convert(&self, dtype: DType, device: Device) -> Result<Tensor> {
        if device.is_meta() {
            return Ok(Tensor::meta(self.shape(), dtype));
        }

        let storage = if dtype == self.dtype() {
            self.0.storage.clone()
        } else {
            Arc::new(match self.storage() {
                Storage::Meta => return Err(TensorError::CopyOutOfMeta(device)),
                Storage::Int(data) => match dtype.is_floating_point() {
                    true => Storage::Float(data.iter().map(|&x| dtype.round_float(x as f64)).collect()),
                    false => Storage::Int(data.iter().map(|&x| dtype.wrap_int(x)).collect()),
                },
                Storage::Float(data) => match (dtype.is_floating_point(), dtype) {
                    (true, _) => Storage::Float(data.iter().map(|&x| dtype.round_float(x)).collect()),
                    (false, DType::Bool) => Storage::Int(data.iter().map(|&x| (x != 0.0) as i64).collect()),
                    (false, _) => Storage::Int(data.iter().map(|&x| dtype.wrap_int(x as i64)).collect()),
                },
            })
        };

        if let Storage::Meta = *storage {
            return Err(TensorError::CopyOutOfMeta(device));
        }
        Ok(Tensor::from_storage(storage, self.shape().to_vec(), dtype, device))
    }

    /// A new handle on the same data, outside of any computational graph.
    pub fn detach(&self) -> Tensor {
        Tensor::from_storage(self.0.storage.clone(), self.shape().to_vec(), self.dtype(), self.device())
    }

    /// Elementwise sum, in the dtype and device of `self`. Not differentiable.
    pub(crate) fn add_detached(&self, other: &Tensor) -> Result<Tensor> {
        if self.shape() != other.shape() {
            return Err(TensorError::ShapeMismatch(self.shape().to_vec(), other.shape().to_vec()));
        }
        let other = other.convert(self.dtype(), self.device())?;
        let storage = match (self.storage(), other.storage()) {
            (Storage::Float(a), Storage::Float(b)) => {
                Storage::Float(a.iter().zip(b).map(|(a, b)| self.dtype().round_float(a + b)).collect())
            },
            (Storage::Int(a), Storage::Int(b)) => {
                Storage::Int(a.iter().zip(b).map(|(a, b)| self.dtype().wrap_int(a.wrapping_add(*b))).collect())
            },
            _ => Storage::Meta,
        };
        Ok(Tensor::from_storage(Arc::new(storage), self.shape().to_vec(), self.dtype(), self.device()))
    }

    /// Sum of all elements, as a zero-dimensional tensor.
    ///
    /// Integral data is summed as `int64`.
    pub fn sum(&self) -> Result<Tensor> {
        if self.requires_grad() {
            autograd::apply::<ops::Sum>(self.clone())
        } else {
            ops::sum_values(self)
        }
    }
}

/// Autograd
impl Tensor {
    fn autograd(&self) -> RwLockReadGuard<'_, AutogradMeta>
    { self.0.autograd.read().unwrap_or_else(PoisonError::into_inner) }

    fn autograd_mut(&self) -> RwLockWriteGuard<'_, AutogradMeta>
    { self.0.autograd.write().unwrap_or_else(PoisonError::into_inner) }

    pub fn requires_grad(&self) -> bool { self.autograd().requires_grad }

    /// Only leaves of the graph can have this changed.
    pub fn set_requires_grad(&self, requires_grad: bool) -> Result<()> {
        if requires_grad && !self.is_floating_point() {
            return Err(TensorError::NonFloatGrad(self.dtype()));
        }
        let mut meta = self.autograd_mut();
        if meta.grad_fn.is_some() {
            return Err(TensorError::NotALeaf);
        }
        meta.requires_grad = requires_grad;
        Ok(())
    }

    /// Builder-style [`Tensor::set_requires_grad`].
    pub fn with_requires_grad(self, requires_grad: bool) -> Result<Tensor> {
        self.set_requires_grad(requires_grad)?;
        Ok(self)
    }

    pub fn is_leaf(&self) -> bool { self.autograd().grad_fn.is_none() }

    /// Gradient accumulated by previous calls to `backward`.
    pub fn grad(&self) -> Option<Tensor> { self.autograd().grad.clone() }

    pub fn zero_grad(&self) { self.autograd_mut().grad = None; }

    /// Name of the function that produced this tensor in the graph, if any.
    pub fn grad_fn_name(&self) -> Option<&'static str>
    { self.autograd().grad_fn.as_ref().map(|node| node.name()) }

    pub(crate) fn grad_fn(&self) -> Option<Arc<Node>> { self.autograd().grad_fn.clone() }

    pub(crate) fn attach_grad_fn(&self, node: Arc<Node>) -> Result<()> {
        let mut meta = self.autograd_mut();
        if meta.requires_grad || meta.grad_fn.is_some() {
            return Err(TensorError::AlreadyInGraph(node.name()));
        }
        meta.requires_grad = true;
        meta.grad_fn = Some(node);
        Ok(())
    }

    pub(crate) fn accumulate_grad(&self, grad: Tensor) -> Result<()> {
        if grad.shape() != self.shape() {
            return Err(TensorError::ShapeMismatch(self.shape().to_vec(), grad.shape().to_vec()));
        }
        let mut meta = self.autograd_mut();
        let total = match meta.grad {
            Some(ref old) => old.add_detached(&grad)?,
            None => grad.convert(self.dtype(), self.device())?,
        };
        meta.grad = Some(total);
        Ok(())
    }

    /// Run the backward pass of the graph ending at this tensor.
    ///
    /// `gradient` may only be omitted for single-element tensors, where it
    /// defaults to one.
    pub fn backward(&self, gradient: Option<&Tensor>) -> Result<()>
    { autograd::backward(self, gradient) }
}

impl PartialEq for Tensor {
    fn eq(&self, other: &Tensor) -> bool {
        self.shape() == other.shape()
            && self.dtype() == other.dtype()
            && self.device() == other.device()
            && self.storage() == other.storage()
    }
}

impl fmt::Debug for Tensor {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut s = f.debug_struct("Tensor");
        s.field("shape", &self.shape());
        s.field("dtype", &self.dtype());
        s.field("device", &self.device());
        match self.storage() {
            Storage::Float(data) => s.field("values", data),
            Storage::Int(data) => s.field("values", data),
            Storage::Meta => s.field("values", &"<meta>"),
        };
        if let Some(name) = self.grad_fn_name() {
            s.field("grad_fn", &name);
        } else if self.requires_grad() {
            s.field("requires_grad", &true);
        }
        s.finish()
    }
}
