use std::sync::Arc;

use shared::constants::{
    IRP_MJ_CLOSE, IRP_MJ_CREATE, IRP_MJ_DEVICE_CONTROL, IRP_MJ_QUERY_SECURITY, IRP_MJ_READ,
    IRP_MJ_SET_SECURITY, IRP_MJ_WRITE,
};

use crate::{
    error::DispatchError,
    irp::{Ccb, FileObject, Irp},
};

/// Printable name of a major function code, for traces.
pub fn major_function_name(major: u32) -> &'static str {
    match major {
        IRP_MJ_CREATE => "IRP_MJ_CREATE",
        IRP_MJ_CLOSE => "IRP_MJ_CLOSE",
        IRP_MJ_READ => "IRP_MJ_READ",
        IRP_MJ_WRITE => "IRP_MJ_WRITE",
        IRP_MJ_DEVICE_CONTROL => "IRP_MJ_DEVICE_CONTROL",
        IRP_MJ_QUERY_SECURITY => "IRP_MJ_QUERY_SECURITY",
        IRP_MJ_SET_SECURITY => "IRP_MJ_SET_SECURITY",
        _ => "IRP_MJ_UNKNOWN",
    }
}

/// The IRP's file object, or a validation error.
pub fn file_object(irp: &Irp) -> Result<&FileObject, DispatchError> {
    irp.file_object
        .as_ref()
        .ok_or(DispatchError::Validation("file object is missing"))
}

/// Per-open context of the IRP's file object.
///
/// A missing file object and a file object without context are rejected alike.
pub fn open_context(irp: &Irp) -> Result<Arc<Ccb>, DispatchError> {
    file_object(irp)?
        .fs_context2
        .clone()
        .ok_or(DispatchError::Validation("per-open context is missing"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_requires_file_object_and_ccb() {
        let (bare, _w1) = Irp::new(IRP_MJ_QUERY_SECURITY);
        assert!(matches!(open_context(&bare), Err(DispatchError::Validation(_))));

        let (no_ccb, _w2) = Irp::new(IRP_MJ_QUERY_SECURITY);
        let no_ccb = no_ccb.with_file_object(FileObject { file_name: "x".into(), fs_context2: None });
        assert!(file_object(&no_ccb).is_ok());
        assert!(open_context(&no_ccb).is_err());

        let (opened, _w3) = Irp::new(IRP_MJ_QUERY_SECURITY);
        let opened = opened.with_file_object(FileObject::opened(Ccb::new(r"\a.txt", 7)));
        assert_eq!(open_context(&opened).unwrap().user_context, 7);
    }

    #[test]
    fn unknown_major_has_a_name() {
        assert_eq!(major_function_name(0x14), "IRP_MJ_QUERY_SECURITY");
        assert_eq!(major_function_name(0x99), "IRP_MJ_UNKNOWN");
    }
}
