pub mod assignments;
pub mod attendance;
pub mod behaviors;
pub mod classes;
pub mod core;
pub mod expectations;
pub mod groups;
pub mod points;
pub mod rewards;
pub mod roster;
pub mod students;
