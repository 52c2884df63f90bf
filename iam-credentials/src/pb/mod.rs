//! Generated protobuf bindings for the IAM Credentials API.
//!
//! **This module contains generated code. Do not edit these files manually.**
//!
//! Regenerate with: `cargo run -p xtask -- gen iam-credentials` from the repo root.
//!
//! Only the messages are generated. The RPC side is served by the transport's own
//! per-method stubs (see [`crate::transport::UnaryStub`]).
#![allow(clippy::all)]
#![allow(missing_docs)]

pub mod google {
    pub mod iam {
        pub mod credentials {
            pub mod v1 {
                include!("google.iam.credentials.v1.rs");
            }
        }
    }
}
