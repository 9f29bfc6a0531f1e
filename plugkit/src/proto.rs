//! Generated protocol buffer types for both plugin protocol versions
//!
//! The code is generated at build time by `tonic-build` from the files under
//! `proto/`. Several generated types share names with plugkit types
//! (`DynamicValue`, `Schema`, `Diagnostic`), so always refer to them through
//! their version module.

pub mod tfplugin6 {
    include!(concat!(env!("OUT_DIR"), "/tfplugin6.rs"));
}

pub mod tfplugin5 {
    include!(concat!(env!("OUT_DIR"), "/tfplugin5.rs"));
}
