//! Error kinds raised by the entity/component manager.

use thiserror::Error;

use crate::component::ComponentId;
use crate::entity::EntityId;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ManagerError {
    #[error("entity {0} is not known to this manager")]
    UnknownEntity(EntityId),

    #[error("component {0:?} is not known to this manager")]
    UnknownComponent(ComponentId),

    #[error("entity {entity} already has a component of this type (component {existing:?})")]
    DuplicateComponent { entity: EntityId, existing: ComponentId },

    #[error("no system registered with type tag '{0}'")]
    UnknownSystemTag(String),
}
