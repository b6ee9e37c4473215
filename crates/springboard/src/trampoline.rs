//! The public gateway: trampoline construction and invocation.

use std::mem;
use std::ptr;

use crate::abi;
use crate::buffer::CodeBuffer;
use crate::isa::{self, CallConv};
use crate::memory::CodeRegion;
use crate::signature::Signature;
use crate::types::CType;
use crate::{Error, Result};

/// One argument cell: the address of caller-owned storage holding a
/// parameter's bit pattern.
///
/// The trampoline reads parameters strictly through these indirections; it
/// never interprets the cells themselves as values. A `&[Arg]` is therefore
/// exactly the in-memory layout the generated code expects: a contiguous,
/// 8-byte-aligned array of pointers.
#[repr(transparent)]
#[derive(Clone, Copy, Debug)]
pub struct Arg(*const u8);

impl Arg {
    /// Build a cell pointing at `value`'s storage.
    ///
    /// The storage must stay alive and unmoved until the invocation that
    /// consumes the cell has returned.
    pub fn from_ref<T>(value: &T) -> Arg {
        Arg((value as *const T).cast())
    }
}

/// A 16-byte, 16-aligned return buffer.
///
/// Large enough for the widest supported return kind (128-bit integers,
/// low half at offset 0). After a successful invocation exactly the return
/// type's width has been written; the remaining bytes keep their previous
/// contents.
#[repr(C, align(16))]
#[derive(Clone, Copy, Debug)]
pub struct RetValue {
    bytes: [u8; 16],
}

impl RetValue {
    /// A zero-initialized buffer.
    pub fn new() -> RetValue {
        RetValue { bytes: [0; 16] }
    }

    /// A buffer with every byte set to `byte`; useful for checking which
    /// bytes an invocation actually wrote.
    pub fn filled(byte: u8) -> RetValue {
        RetValue { bytes: [byte; 16] }
    }

    /// The raw buffer contents.
    pub fn bytes(&self) -> &[u8; 16] {
        &self.bytes
    }

    pub(crate) fn as_mut_ptr(&mut self) -> *mut u8 {
        self.bytes.as_mut_ptr()
    }

    /// Reinterpret the low bytes as a `T`.
    ///
    /// # Safety
    ///
    /// `T` must be the Rust equivalent of the invoked signature's return
    /// type; reading a type wider than what the callee produced yields
    /// whatever bytes were in the buffer beforehand.
    pub unsafe fn get<T: Copy>(&self) -> T {
        debug_assert!(mem::size_of::<T>() <= 16);
        unsafe { ptr::read(self.bytes.as_ptr().cast()) }
    }
}

impl Default for RetValue {
    fn default() -> Self {
        RetValue::new()
    }
}

/// The machine signature every trampoline body implements.
type Gateway = unsafe extern "C" fn(*const Arg, usize, *mut u8);

/// A compiled, callable trampoline bound to one [`Signature`].
///
/// Construction classifies the signature for the host's calling
/// convention, emits the body, copies it into a fresh executable region,
/// and synchronizes the instruction cache; the cache sync completes before
/// the constructor returns, which is the happens-before edge making the
/// trampoline safe to hand to other threads. The region is written only
/// during construction, so a single trampoline may be invoked concurrently
/// without synchronization. Dropping the trampoline releases the region
/// and the signature with it.
pub struct Trampoline {
    sig: Signature,
    region: CodeRegion,
    len: usize,
}

// Invocation only reads and executes the write-once code region; no
// instance state is mutated on the call path.
unsafe impl Send for Trampoline {}
unsafe impl Sync for Trampoline {}

impl Trampoline {
    /// Compile a trampoline for `sig` targeting the host ABI.
    pub fn new(sig: Signature) -> Result<Trampoline> {
        let conv = CallConv::host();
        let plan = abi::classify(&sig, conv)?;
        let mut buf = CodeBuffer::with_capacity(isa::CODE_CAPACITY);
        isa::compile(&mut buf, &sig, &plan, conv)?;
        let code = buf.finish()?;
        log::debug!(
            "compiled `{}` for {conv}: {} bytes, callee {:#x}",
            sig.name(),
            code.len(),
            sig.callee(),
        );
        Self::install(sig, &code)
    }

    /// Install caller-provided machine code as the trampoline body instead
    /// of compiling one.
    ///
    /// Fails if `code` exceeds the code-region reservation.
    ///
    /// # Safety
    ///
    /// The bytes must form a complete function implementing the gateway
    /// convention `extern "C" fn(*const Arg, usize, *mut u8)` for the host
    /// ABI; the engine installs them verbatim.
    pub unsafe fn with_body(sig: Signature, code: &[u8]) -> Result<Trampoline> {
        if code.len() > isa::CODE_CAPACITY {
            return Err(Error::CodeTooLarge {
                capacity: isa::CODE_CAPACITY,
            });
        }
        log::debug!(
            "installing {} caller-supplied bytes for `{}`",
            code.len(),
            sig.name()
        );
        Self::install(sig, code)
    }

    fn install(sig: Signature, code: &[u8]) -> Result<Trampoline> {
        let mut region = CodeRegion::allocate(isa::CODE_CAPACITY)?;
        region.publish(code);
        if log::log_enabled!(log::Level::Trace) {
            let hex: String = code.iter().map(|b| format!("{b:02x}")).collect();
            log::trace!("`{}` at {:p}: {hex}", sig.name(), region.as_ptr());
        }
        Ok(Trampoline {
            sig,
            region,
            len: code.len(),
        })
    }

    /// The signature this trampoline was compiled from.
    pub fn signature(&self) -> &Signature {
        &self.sig
    }

    /// Length in bytes of the emitted body.
    pub fn code_len(&self) -> usize {
        self.len
    }

    /// Invoke the callee through the compiled trampoline.
    ///
    /// `args` must hold exactly one cell per declared parameter, and `ret`
    /// must be `Some` exactly when the return type is non-void; violations
    /// fail with an error before anything is called. The invocation runs to
    /// completion on the current thread like any synchronous C call.
    ///
    /// # Safety
    ///
    /// Each cell must point to live storage of the corresponding declared
    /// type, and the callee recorded in the signature must actually have
    /// that C signature. The engine cannot check either; a mismatch is
    /// undefined behavior exactly as the equivalent direct C call would be.
    pub unsafe fn invoke(&self, args: &[Arg], ret: Option<&mut RetValue>) -> Result<()> {
        if args.len() != self.sig.params().len() {
            return Err(Error::ArgCountMismatch {
                expected: self.sig.params().len(),
                got: args.len(),
            });
        }
        if ret.is_some() != (self.sig.ret() != CType::Void) {
            return Err(Error::ReturnBufferMismatch);
        }
        let ret_ptr = ret.map_or(ptr::null_mut(), |r| r.as_mut_ptr());

        log::trace!("invoking `{}` with {} argument(s)", self.sig.name(), args.len());
        let entry: Gateway = unsafe { mem::transmute(self.region.as_ptr()) };
        unsafe { entry(args.as_ptr(), args.len(), ret_ptr) };
        Ok(())
    }
}

impl Drop for Trampoline {
    fn drop(&mut self) {
        log::debug!("releasing trampoline for `{}`", self.sig.name());
    }
}
