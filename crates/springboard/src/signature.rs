//! Runtime descriptions of foreign functions.

use crate::types::CType;

/// An immutable description of a C function: parameter and return types
/// plus the callee's entry address.
///
/// The name is used only in diagnostics. The signature is owned by the
/// [`Trampoline`](crate::Trampoline) built from it and lives exactly as
/// long as the trampoline does.
#[derive(Debug, Clone)]
pub struct Signature {
    name: String,
    ret: CType,
    params: Vec<CType>,
    callee: usize,
}

impl Signature {
    /// Describe the foreign function located at `callee`.
    ///
    /// The address is typically obtained by casting a function pointer
    /// (`f as extern "C" fn(...) -> _ as usize`) or from a dynamic loader.
    pub fn new(
        name: impl Into<String>,
        ret: CType,
        params: impl Into<Vec<CType>>,
        callee: usize,
    ) -> Self {
        Signature {
            name: name.into(),
            ret,
            params: params.into(),
            callee,
        }
    }

    /// The diagnostic name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The return type.
    pub fn ret(&self) -> CType {
        self.ret
    }

    /// The parameter types, in declaration order.
    pub fn params(&self) -> &[CType] {
        &self.params
    }

    /// The callee's entry address.
    pub fn callee(&self) -> usize {
        self.callee
    }
}
