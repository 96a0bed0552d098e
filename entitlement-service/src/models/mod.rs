pub mod children_reference;
pub mod entity_node;
pub mod events;
pub mod group_type;
pub mod parent_reference;
pub mod role;

pub use children_reference::{ChildrenReference, ChildrenTreeDto};
pub use entity_node::{EntityNode, NodeType};
pub use events::{ChangeEvent, ChangeEventAction, ChangeEventKind};
pub use group_type::GroupType;
pub use parent_reference::{ParentReference, ParentTreeDto};
pub use role::Role;
