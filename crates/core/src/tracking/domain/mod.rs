pub mod box_stabilizer;
pub mod identity_resolver;
pub mod track_registry;
pub mod track_state;
