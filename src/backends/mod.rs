// SPDX-License-Identifier: MPL-2.0

//! Boundaries to the collaborators around the frame pipeline
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │              Preview Pipeline               │
//! └──────┬──────────────┬───────────────┬───────┘
//!        │              │               │
//! ┌──────┴──────┐ ┌─────┴──────┐ ┌──────┴───────┐
//! │   Source    │ │  Analysis  │ │    Assets    │
//! │ (RawFrames) │ │ (service)  │ │ (filter dir) │
//! └─────────────┘ └────────────┘ └──────────────┘
//! ```
//!
//! # Modules
//!
//! - [`analysis`]: Analysis service trait, client and stub service
//! - [`assets`]: Read-only filter asset stores
//! - [`source`]: Frame producers feeding the pipeline

pub mod analysis;
pub mod assets;
pub mod source;
