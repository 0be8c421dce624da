//! Tests for the assistant SDK
//!
//! Orchestrator behavior is exercised against a scripted in-memory
//! transport; the HTTP transport against a WireMock server.

pub mod support;

pub mod orchestrator_tests;
