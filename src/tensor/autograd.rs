/* ************************************************************************ **
** This file is part of mlsys, and is licensed under EITHER the MIT license **
** or the Apache 2.0 license, at your option.                               **
**                                                                          **
**     http://www.apache.org/licenses/LICENSE-2.0                           **
**     http://opensource.org/licenses/MIT                                   **
** ************************************************************************ */

//! Custom differentiation rules and the backward pass.
//!
//! A [`Function`] is a `{forward, backward}` pair. Calling [`apply`] runs the
//! forward half immediately and, if any differentiable input requires a
//! gradient, attaches a graph node to the returned tensor. The node keeps the
//! context that `forward` filled in, so that `backward` can use it later.

use crate::{Tensor, TensorError, Result};

use ::std::collections::{HashMap, HashSet, VecDeque};
use ::std::sync::Arc;

/// State handed from `forward` to `backward`.
#[derive(Debug, Default)]
pub struct AutogradContext {
    saved: Vec<Tensor>,
    needs_input_grad: Vec<bool>,
}

impl AutogradContext {
    /// Keep tensors around for the backward pass.
    ///
    /// Tensors are stored detached from the graph; use
    /// [`AutogradContext::needs_input_grad`] to know which inputs wanted a
    /// gradient.
    pub fn save_for_backward<I>(&mut self, tensors: I)
    where I: IntoIterator<Item=Tensor>,
    { self.saved.extend(tensors.into_iter().map(|t| t.detach())); }

    pub fn saved_tensors(&self) -> &[Tensor] { &self.saved }

    /// Whether the `index`-th differentiable input required a gradient
    /// when `forward` ran.
    pub fn needs_input_grad(&self, index: usize) -> bool
    { self.needs_input_grad.get(index).cloned().unwrap_or(false) }
}

/// A differentiation rule written by hand.
pub trait Function {
    /// Everything `forward` consumes, differentiable or not.
    type Input;
    type Error: From<TensorError>;

    /// Shows up in [`Tensor::grad_fn_name`].
    const NAME: &'static str;

    /// The tensors of `input` that gradients flow back to, in the order
    /// used by the output of `backward`.
    fn differentiable_inputs(input: &Self::Input) -> Vec<Tensor>;

    fn forward(ctx: &mut AutogradContext, input: Self::Input) -> ::std::result::Result<Tensor, Self::Error>;

    /// Gradients with respect to each differentiable input. `None` means
    /// "no gradient" and is always acceptable.
    fn backward(ctx: &AutogradContext, grad_output: &Tensor) -> Result<Vec<Option<Tensor>>>;
}

type BackwardFn = fn(&AutogradContext, &Tensor) -> Result<Vec<Option<Tensor>>>;

/// A node of the graph: one call to `apply`.
pub(crate) struct Node {
    name: &'static str,
    ctx: AutogradContext,
    backward: BackwardFn,
    next: Vec<Edge>,
}

impl Node {
    pub(crate) fn name(&self) -> &'static str { self.name }
}

/// Where the gradient for one input of a node goes.
enum Edge {
    Untracked,
    Leaf(Tensor),
    Node(Arc<Node>),
}

impl Edge {
    fn for_input(tensor: &Tensor) -> Edge {
        if !tensor.requires_grad() {
            return Edge::Untracked;
        }
        match tensor.grad_fn() {
            Some(node) => Edge::Node(node),
            None => Edge::Leaf(tensor.clone()),
        }
    }
}

/// Run `F::forward` and register `F::backward` in the graph.
///
/// The tensor returned by `forward` is attached to the graph in place, so it
/// must not already be part of one. It may be a tensor that is shared with
/// other owners (they will then see it as part of the graph too).
pub fn apply<F: Function>(input: F::Input) -> ::std::result::Result<Tensor, F::Error> {
    let inputs = F::differentiable_inputs(&input);
    let needs_input_grad = inputs.iter().map(Tensor::requires_grad).collect::<Vec<_>>();
    let any_grad = needs_input_grad.iter().any(|&x| x);

    let mut ctx = AutogradContext { saved: vec![], needs_input_grad };
    let output = F::forward(&mut ctx, input)?;

    if any_grad {
        let next = inputs.iter().map(Edge::for_input).collect();
        let node = Arc::new(Node { name: F::NAME, ctx, backward: F::backward, next });
        output.attach_grad_fn(node)?;
        trace!("registered {} in the graph", F::NAME);
    }
    Ok(output)
}

fn key(node: &Arc<Node>) -> usize { Arc::as_ptr(node) as usize }

pub(crate) fn backward(root: &Tensor, gradient: Option<&Tensor>) -> Result<()> {
    if !root.requires_grad() {
        return Err(TensorError::NoGrad);
    }

    let gradient = match gradient {
        Some(gradient) => {
            if gradient.shape() != root.shape() {
                return Err(TensorError::ShapeMismatch(root.shape().to_vec(), gradient.shape().to_vec()));
            }
            gradient.detach().convert(root.dtype(), root.device())?
        },
        None => {
            if root.numel() != 1 {
                return Err(TensorError::ImplicitGradient(root.shape().to_vec()));
            }
            Tensor::full(root.shape(), 1.0, root.dtype(), root.device())
        },
    };

    let root_node = match root.grad_fn() {
        Some(node) => node,
        None => return root.accumulate_grad(gradient),
    };

    // number of edges pointing at each node; a node runs once all of them are done
    let mut dependencies = HashMap::<usize, usize>::new();
    let mut visited = HashSet::new();
    visited.insert(key(&root_node));
    let mut stack = vec![root_node.clone()];
    while let Some(node) = stack.pop() {
        for edge in &node.next {
            if let Edge::Node(next) = edge {
                *dependencies.entry(key(next)).or_insert(0) += 1;
                if visited.insert(key(next)) {
                    stack.push(next.clone());
                }
            }
        }
    }

    let mut pending = HashMap::<usize, Tensor>::new();
    pending.insert(key(&root_node), gradient);

    let mut ready = VecDeque::new();
    ready.push_back(root_node);
    while let Some(node) = ready.pop_front() {
        let grads = match pending.remove(&key(&node)) {
            Some(grad) => (node.backward)(&node.ctx, &grad)?,
            None => vec![],
        };
        if !grads.is_empty() && grads.len() != node.next.len() {
            return Err(TensorError::Backward {
                function: node.name,
                message: format!("expected {} gradients, got {}", node.next.len(), grads.len()),
            });
        }

        let mut grads = grads.into_iter();
        for edge in &node.next {
            let grad = grads.next().and_then(|g| g);
            match edge {
                Edge::Untracked => {},
                Edge::Leaf(tensor) => {
                    if let Some(grad) = grad {
                        tensor.accumulate_grad(grad)?;
                    }
                },
                Edge::Node(next) => {
                    if let Some(grad) = grad {
                        let total = match pending.remove(&key(next)) {
                            Some(old) => old.add_detached(&grad)?,
                            None => grad,
                        };
                        pending.insert(key(next), total);
                    }
                    if let Some(count) = dependencies.get_mut(&key(next)) {
                        *count -= 1;
                        if *count == 0 {
                            ready.push_back(next.clone());
                        }
                    }
                },
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DType;

    /// y = factor * x, with the factor not differentiable.
    struct Scale;
    impl Function for Scale {
        type Input = (Tensor, f64);
        type Error = TensorError;
        const NAME: &'static str = "ScaleBackward";

        fn differentiable_inputs(input: &Self::Input) -> Vec<Tensor> { vec![input.0.clone()] }

        fn forward(ctx: &mut AutogradContext, (x, factor): Self::Input) -> Result<Tensor> {
            ctx.save_for_backward(vec![Tensor::from_f64(vec![factor], &[])?]);
            let values = x.to_f64_vec()?.into_iter().map(|v| v * factor).collect();
            Tensor::from_floats(values, x.shape(), x.dtype())
        }

        fn backward(ctx: &AutogradContext, grad_output: &Tensor) -> Result<Vec<Option<Tensor>>> {
            let factor = ctx.saved_tensors()[0].item()?;
            let values = grad_output.to_f64_vec()?.into_iter().map(|g| g * factor).collect();
            Ok(vec![Some(Tensor::from_floats(values, grad_output.shape(), grad_output.dtype())?)])
        }
    }

    #[test]
    fn chain_rule() {
        let x = Tensor::from_f64(vec![1.0, 2.0, 3.0], &[3]).unwrap().with_requires_grad(true).unwrap();
        let y = apply::<Scale>((x.clone(), 3.0)).unwrap();
        assert_eq!(y.grad_fn_name(), Some("ScaleBackward"));

        let total = y.sum().unwrap();
        total.backward(None).unwrap();
        assert_eq!(x.grad().unwrap().to_f64_vec().unwrap(), vec![3.0, 3.0, 3.0]);

        // gradients accumulate over calls
        total.backward(None).unwrap();
        assert_eq!(x.grad().unwrap().to_f64_vec().unwrap(), vec![6.0, 6.0, 6.0]);
    }

    #[test]
    fn nested_functions() {
        let x = Tensor::from_f64(vec![1.0, 1.0], &[2]).unwrap().with_requires_grad(true).unwrap();
        let a = apply::<Scale>((x.clone(), 2.0)).unwrap();
        let b = apply::<Scale>((a.clone(), 5.0)).unwrap();

        let gradient = Tensor::from_f64(vec![1.0, -1.0], &[2]).unwrap();
        b.backward(Some(&gradient)).unwrap();
        assert_eq!(x.grad().unwrap().to_f64_vec().unwrap(), vec![10.0, -10.0]);
        assert!(a.grad().is_none());
    }

    #[test]
    fn no_graph_without_grad() {
        let x = Tensor::from_f64(vec![1.0], &[1]).unwrap();
        let y = apply::<Scale>((x, 2.0)).unwrap();
        assert!(!y.requires_grad());
        match y.backward(None) {
            Err(TensorError::NoGrad) => {},
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn implicit_gradient_needs_scalar() {
        let x = Tensor::from_f64(vec![1.0, 2.0], &[2]).unwrap().with_requires_grad(true).unwrap();
        let y = apply::<Scale>((x, 2.0)).unwrap();
        assert!(y.backward(None).is_err());
    }

    #[test]
    fn through_casts() {
        let x = Tensor::from_f64(vec![0.5, 1.5], &[2]).unwrap().with_requires_grad(true).unwrap();
        let single = x.to(Some(DType::Float32), None).unwrap();
        assert_eq!(single.grad_fn_name(), Some("ToCopyBackward"));

        single.sum().unwrap().backward(None).unwrap();
        let grad = x.grad().unwrap();
        assert_eq!(grad.dtype(), DType::Float64);
        assert_eq!(grad.to_f64_vec().unwrap(), vec![1.0, 1.0]);
    }
}
