//! Visa Requirements Scrape API Library
//!
//! This library provides the core functionality for the visa requirements
//! API: multi-source scraping of government visa pages, hybrid LLM +
//! pattern requirement extraction, deterministic merging, and a durable
//! TTL cache with stale fallback.
//!
//! # Modules
//!
//! - `api`: API definitions.
//! - `core`: Core business logic.
//! - `integrations`: External service integrations.
//! - `cache`: Durable visa-data cache with TTL and stale fallback.
//! - `cache_validator`: Cache entry integrity validation.
//! - `circuit_breaker`: Circuit breaker for outbound crawls.
//! - `config`: Configuration management.
//! - `crawler`: Page fetching and HTML text extraction.
//! - `errors`: Error handling types.
//! - `extractor`: Hybrid LLM + keyword requirement extraction.
//! - `handlers`: HTTP request handlers.
//! - `llm_client`: LLM structured-generation client.
//! - `merge`: Multi-source result merging.
//! - `models`: Core data models.
//! - `scraper_service`: Scrape orchestration and cache-aware entry points.
//! - `sources`: Source URL resolution tables.

pub mod api;
pub mod core;
pub mod integrations;

// Re-export primary modules for shared use in tests and other binaries
pub mod cache;
pub mod cache_validator;
pub mod circuit_breaker;
pub mod config;
pub mod crawler;
pub mod errors;
pub mod extractor;
pub mod handlers;
pub mod llm_client;
pub mod merge;
pub mod models;
pub mod scraper_service;
pub mod sources;
