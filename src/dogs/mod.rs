pub mod domain;
pub mod repository;

pub use domain::{DogEditForm, DogForm, DogId, DogRecord, DogUpdate, NewDog};
pub use repository::{DogRepository, SqliteDogRepository};
