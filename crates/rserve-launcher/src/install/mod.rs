//! Rserve package installation into the private R library.

mod installer;

pub use installer::{
    classify_install_output, classify_membership, InstallOutcome, InstallState, Installer,
    Membership,
};
