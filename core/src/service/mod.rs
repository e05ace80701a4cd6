pub mod dto;
pub mod tracking_service;
