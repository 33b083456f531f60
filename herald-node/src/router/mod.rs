// Distance-vector routing: liveness probing (`hellos`) and roads
// advertisement (`roads`).

pub mod hellos;
pub mod roads;

pub use hellos::{HelloRouter, NeighbourInfo, RouterTag};
pub use roads::RoadsRouter;
