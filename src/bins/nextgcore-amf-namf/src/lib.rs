//! NextGCore AMF Namf mobility and session orchestration
//!
//! Serves the Namf_Communication and Namf_Callback requests of the AMF:
//! N1N2 message transfer with paging of idle UEs, PDU session release
//! tracking, UE context transfer, subscriber-data change handling and
//! network-initiated deregistration.

pub mod config;
pub mod context;
pub mod deregistration;
pub mod error;
pub mod event;
pub mod gmm_build;
pub mod metrics;
pub mod models;
pub mod n1n2_transfer;
pub mod namf_handler;
pub mod nas_path;
pub mod ngap_build;
pub mod ngap_path;
pub mod paging;
pub mod pending;
pub mod release;
pub mod sbi_path;
pub mod sdm_change;
pub mod timer;
pub mod ue_context_transfer;

#[cfg(test)]
mod property_tests;
