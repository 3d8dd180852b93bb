// ABOUTME: Marketing platform API integration - events, profiles, list membership
// ABOUTME: Speaks the platform's JSON:API dialect with a pinned revision header

mod client;
mod models;

pub use client::MarketingClient;
