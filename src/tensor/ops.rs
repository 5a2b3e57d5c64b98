/* ************************************************************************ **
** This file is part of mlsys, and is licensed under EITHER the MIT license **
** or the Apache 2.0 license, at your option.                               **
**                                                                          **
**     http://www.apache.org/licenses/LICENSE-2.0                           **
**     http://opensource.org/licenses/MIT                                   **
** ************************************************************************ */

use crate::{Tensor, TensorError, Result, DType, Device};
use crate::autograd::{AutogradContext, Function};
use crate::tensor::Storage;

pub(crate) fn sum_values(tensor: &Tensor) -> Result<Tensor> {
    match tensor.storage() {
        Storage::Float(data) => {
            let total = data.iter().sum::<f64>();
            Ok(Tensor::full(&[], total, tensor.dtype(), tensor.device()))
        },
        Storage::Int(data) => {
            let total = data.iter().fold(0i64, |acc, &x| acc.wrapping_add(x));
            Tensor::from_i64(vec![total], &[])?.convert(DType::Int64, tensor.device())
        },
        Storage::Meta => Ok(Tensor::meta(&[], tensor.dtype())),
    }
}

pub(crate) struct Sum;

impl Function for Sum {
    type Input = Tensor;
    type Error = TensorError;
    const NAME: &'static str = "SumBackward";

    fn differentiable_inputs(input: &Tensor) -> Vec<Tensor> { vec![input.clone()] }

    fn forward(ctx: &mut AutogradContext, input: Tensor) -> Result<Tensor> {
        let output = sum_values(&input)?;
        ctx.save_for_backward(Some(input));
        Ok(output)
    }

    fn backward(ctx: &AutogradContext, grad_output: &Tensor) -> Result<Vec<Option<Tensor>>> {
        let input = &ctx.saved_tensors()[0];
        let grad = match input.device() {
            Device::Meta => Tensor::meta(input.shape(), input.dtype()),
            device => Tensor::full(input.shape(), grad_output.item()?, input.dtype(), device),
        };
        Ok(vec![Some(grad)])
    }
}

/// Differentiable dtype/device conversion.
pub(crate) struct ToCopy;

impl Function for ToCopy {
    type Input = (Tensor, DType, Device);
    type Error = TensorError;
    const NAME: &'static str = "ToCopyBackward";

    fn differentiable_inputs(input: &Self::Input) -> Vec<Tensor> { vec![input.0.clone()] }

    fn forward(ctx: &mut AutogradContext, (input, dtype, device): Self::Input) -> Result<Tensor> {
        let output = input.convert(dtype, device)?;
        ctx.save_for_backward(Some(input));
        Ok(output)
    }

    fn backward(ctx: &AutogradContext, grad_output: &Tensor) -> Result<Vec<Option<Tensor>>> {
        let input = &ctx.saved_tensors()[0];
        Ok(vec![Some(grad_output.convert(input.dtype(), input.device())?)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sums() {
        let floats = Tensor::from_f32(vec![0.5, 0.25, 1.0], &[3]).unwrap();
        let total = floats.sum().unwrap();
        assert_eq!(total.shape(), &[] as &[usize]);
        assert_eq!(total.dtype(), DType::Float32);
        assert_eq!(total.item().unwrap(), 1.75);

        let ints = Tensor::from_i32(vec![1, 2, 3], &[3]).unwrap();
        let total = ints.sum().unwrap();
        assert_eq!(total.dtype(), DType::Int64);
        assert_eq!(total.item().unwrap(), 6.0);
    }

    #[test]
    fn sum_backward_is_broadcast() {
        let x = Tensor::from_f64(vec![1.0; 6], &[2, 3]).unwrap().with_requires_grad(true).unwrap();
        x.sum().unwrap().backward(Some(&Tensor::from_f64(vec![2.5], &[]).unwrap())).unwrap();
        assert_eq!(x.grad().unwrap(), Tensor::from_f64(vec![2.5; 6], &[2, 3]).unwrap());
    }
}
