pub mod bulk;
pub mod classes;
pub mod core;
pub mod departments;
pub mod people;
pub mod roster;
pub mod staff;
pub mod students;
