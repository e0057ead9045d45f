//! HTTP API handlers, one module per resource group

pub mod calendar;
pub mod finance;
pub mod habits;
pub mod health;
pub mod items;
pub mod knowledge;
pub mod meals;
pub mod ocr;
pub mod packages;
pub mod projects;
pub mod services;
pub mod tasks;
pub mod tracking;
pub mod users;
