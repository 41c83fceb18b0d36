pub mod allocator;
pub mod battery;
pub mod controller;
pub mod gateway;
pub mod history;
pub mod observer;
pub mod settings;
pub mod state;
pub mod state_of_charge;
