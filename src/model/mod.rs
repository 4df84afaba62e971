//! # Property Graph Model
//!
//! Clean DTOs that define the property graph seen by the query engine.
//! These types cross every boundary: storage ↔ parser ↔ execution ↔ user.
//!
//! Design rule: this module is pure data — no I/O, no locks, no engine
//! state. Anything that touches storage lives elsewhere.

pub mod node;
pub mod relationship;
pub mod path;
pub mod value;
pub mod property_map;

pub use node::{Node, NodeId};
pub use relationship::{Relationship, RelId, Direction};
pub use path::Path;
pub use value::Value;
pub use property_map::{PropertyMap, params_from_json};
