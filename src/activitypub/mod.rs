/// ActivityPub core: the activity-processing pipeline.
///
/// An inbound write flows resolver → verifier → persistence; an inbound
/// read flows pagination → factory. `routing` and `render` are the shared
/// leaves: URL-to-resource mapping and resource-to-wire rendering.

pub mod factory;
pub mod pagination;
pub mod render;
pub mod resolver;
pub mod routing;
pub mod verify;
pub mod vocab;
