mod costprovider;
mod error;
mod events;
mod grid;
mod localsearch;
mod location;
mod navigationsystem;
mod pathcache;
mod pathfinder;
mod pathrequest;
mod pathresult;
mod pool;
mod reservationtable;
mod room;
mod roomsearch;
mod scheduler;
mod tile;
mod traits;
mod utility;

pub use costprovider::*;
pub use error::*;
pub use events::*;
pub use grid::*;
pub use localsearch::*;
pub use location::*;
pub use navigationsystem::*;
pub use pathcache::*;
pub use pathfinder::*;
pub use pathrequest::*;
pub use pathresult::*;
pub use pool::*;
pub use reservationtable::*;
pub use room::*;
pub use roomsearch::*;
pub use scheduler::*;
pub use tile::*;
pub use traits::*;
pub use utility::*;
