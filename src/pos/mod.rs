// ABOUTME: POS vendor API integration - fetches sale tickets and purchase orders
// ABOUTME: Maps the vendor's wire format into domain transaction records

mod client;
mod models;

pub use client::PosClient;
