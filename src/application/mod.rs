//! Application Layer
//!
//! Contains the services of the messaging core and the data transfer
//! objects exchanged with clients. This layer orchestrates the flow of data
//! between the presentation and domain layers.

pub mod dto;
pub mod services;
