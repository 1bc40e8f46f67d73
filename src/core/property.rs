//! Constant-or-function properties.
//!
//! Every configurable field of an interface (weight, delay, receptor, neuron selection,
//! transformer parameters) is a [`Property`]: either a constant, a function of one region node,
//! or a function of a (source, target) pair of region nodes. Builders only ever see the uniform
//! function returned by [`Property::as_function`].
use derivative::Derivative;
use std::fmt;
use std::sync::Arc;

/// A function of a single region node index.
pub type NodeFn<T> = Arc<dyn Fn(usize) -> T + Send + Sync>;
/// A function of a (source, target) pair of region node indices.
pub type PairFn<T> = Arc<dyn Fn(usize, usize) -> T + Send + Sync>;

/// A configurable value, given as a constant or as a function of region node indices.
#[derive(Derivative)]
#[derivative(Clone(bound = "T: Clone"))]
pub enum Property<T> {
    Constant(T),
    Node(NodeFn<T>),
    Pair(PairFn<T>),
}

impl<T> Property<T> {
    /// A property returning `value` for every node or pair of nodes.
    pub fn constant(value: T) -> Self {
        Property::Constant(value)
    }

    /// A property evaluated per region node.
    pub fn per_node<F>(f: F) -> Self
    where
        F: Fn(usize) -> T + Send + Sync + 'static,
    {
        Property::Node(Arc::new(f))
    }

    /// A property evaluated per (source, target) pair of region nodes.
    pub fn per_pair<F>(f: F) -> Self
    where
        F: Fn(usize, usize) -> T + Send + Sync + 'static,
    {
        Property::Pair(Arc::new(f))
    }

    /// Returns true if the property ignores its arguments.
    pub fn is_constant(&self) -> bool {
        matches!(self, Property::Constant(_))
    }
}

impl<T: Clone + Send + Sync + 'static> Property<T> {
    /// Returns the property as a function of a (source, target) pair.
    /// A per-node function is evaluated at the target (receiving) node.
    pub fn as_function(&self) -> PairFn<T> {
        match self {
            Property::Constant(value) => {
                let value = value.clone();
                Arc::new(move |_, _| value.clone())
            }
            Property::Node(f) => {
                let f = Arc::clone(f);
                Arc::new(move |_, target| f(target))
            }
            Property::Pair(f) => Arc::clone(f),
        }
    }

    /// Returns the property as a function of a single node.
    /// A per-pair function is evaluated at (node, node).
    pub fn as_node_function(&self) -> NodeFn<T> {
        match self {
            Property::Constant(value) => {
                let value = value.clone();
                Arc::new(move |_| value.clone())
            }
            Property::Node(f) => Arc::clone(f),
            Property::Pair(f) => {
                let f = Arc::clone(f);
                Arc::new(move |node| f(node, node))
            }
        }
    }

    /// Evaluate the property at a single node.
    pub fn at_node(&self, node: usize) -> T {
        match self {
            Property::Constant(value) => value.clone(),
            Property::Node(f) => f(node),
            Property::Pair(f) => f(node, node),
        }
    }

    /// Evaluate the property at a (source, target) pair of nodes.
    pub fn at_pair(&self, source: usize, target: usize) -> T {
        match self {
            Property::Constant(value) => value.clone(),
            Property::Node(f) => f(target),
            Property::Pair(f) => f(source, target),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Property<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Property::Constant(value) => write!(f, "Constant({:?})", value),
            Property::Node(_) => write!(f, "Node(<fn>)"),
            Property::Pair(_) => write!(f, "Pair(<fn>)"),
        }
    }
}

impl From<f64> for Property<f64> {
    fn from(value: f64) -> Self {
        Property::Constant(value)
    }
}

/// A neuron selection rule: maps the neuron ids of a population to the subset to connect.
pub type NeuronsSelector = Arc<dyn Fn(&[usize]) -> Vec<usize> + Send + Sync>;

/// Build a selector keeping every `step`-th neuron, starting from `start`.
pub fn every_nth(start: usize, step: usize) -> NeuronsSelector {
    let step = step.max(1);
    Arc::new(move |neurons: &[usize]| neurons.iter().skip(start).step_by(step).copied().collect())
}
