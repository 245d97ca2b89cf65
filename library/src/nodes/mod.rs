//! Node types every registry built with
//! [`NodeRegistry::with_builtin_nodes`](crate::registry::NodeRegistry::with_builtin_nodes)
//! knows about.

pub mod context;
pub mod math;
pub mod vector;

pub use self::context::{ContextOverride, ContextVariable};
pub use self::math::{Arithmetic, Operation, Square};
pub use self::vector::{Decompose, Length};

use crate::registry::NodeRegistry;

pub fn register_builtin_nodes(registry: &NodeRegistry) {
    registry.register("Square", || Box::new(Square));
    for operation in Operation::ALL {
        registry.register(operation.name(), move || Box::new(Arithmetic::new(operation)));
    }
    registry.register("ContextVariable", || Box::new(ContextVariable));
    registry.register("ContextOverride", || Box::new(ContextOverride));
    registry.register("Length", || Box::new(Length));
    registry.register("Decompose", || Box::new(Decompose));
}
