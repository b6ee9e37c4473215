//! End-to-end tests: compile trampolines for real `extern "C"` callees and
//! invoke them through the generic gateway on the host ABI.

use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;

use springboard::{Arg, CType, Error, RetValue, Signature, Trampoline};

#[cfg(windows)]
type CLong = i32;
#[cfg(not(windows))]
type CLong = i64;
#[cfg(windows)]
type CULong = u32;
#[cfg(not(windows))]
type CULong = u64;
#[cfg(windows)]
type CWchar = u16;
#[cfg(not(windows))]
type CWchar = i32;

fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn trampoline(name: &str, ret: CType, params: &[CType], callee: usize) -> Trampoline {
    init();
    Trampoline::new(Signature::new(name, ret, params.to_vec(), callee)).unwrap()
}

/// Invoke with a fresh return buffer and read the result back as `R`.
unsafe fn call<R: Copy>(t: &Trampoline, args: &[Arg]) -> R {
    let mut ret = RetValue::new();
    unsafe {
        t.invoke(args, Some(&mut ret)).unwrap();
        ret.get()
    }
}

macro_rules! identity_tests {
    ($( $(#[$attr:meta])* $test:ident: $cty:expr, $rust:ty, [$($val:expr),+ $(,)?]; )*) => {$(
        $(#[$attr])*
        #[test]
        fn $test() {
            extern "C" fn identity(v: $rust) -> $rust {
                v
            }
            let f: extern "C" fn($rust) -> $rust = identity;
            let t = trampoline(stringify!($test), $cty, &[$cty], f as usize);
            for v in [$($val),+] {
                let got: $rust = unsafe { call(&t, &[Arg::from_ref(&v)]) };
                assert_eq!(got, v);
            }
        }
    )*};
}

identity_tests! {
    bool_identity: CType::Bool, bool, [false, true];
    char_identity: CType::Char, u8, [0, b'A', u8::MAX];
    schar_identity: CType::SChar, i8, [i8::MIN, -1, 0, i8::MAX];
    uchar_identity: CType::UChar, u8, [0, 128, u8::MAX];
    short_identity: CType::Short, i16, [i16::MIN, -42, 0, i16::MAX];
    sshort_identity: CType::SShort, i16, [i16::MIN, i16::MAX];
    ushort_identity: CType::UShort, u16, [0, 54321, u16::MAX];
    int_identity: CType::Int, i32, [i32::MIN, -1, 0, 1, i32::MAX];
    sint_identity: CType::SInt, i32, [i32::MIN, i32::MAX];
    uint_identity: CType::UInt, u32, [0, 1, u32::MAX];
    long_identity: CType::Long, CLong, [CLong::MIN, 0, CLong::MAX];
    ulong_identity: CType::ULong, CULong, [0, CULong::MAX];
    llong_identity: CType::LLong, i64, [i64::MIN, 0, i64::MAX];
    sllong_identity: CType::SLLong, i64, [i64::MIN, i64::MAX];
    ullong_identity: CType::ULLong, u64, [0, u64::MAX];
    float_identity: CType::Float, f32, [f32::MIN, -0.5, 0.0, 1.5, f32::MAX];
    double_identity: CType::Double, f64, [f64::MIN, -0.5, 0.0, 2.5, f64::MAX];
    wchar_identity: CType::WChar, CWchar, [0, 0x2603, CWchar::MAX];
    size_t_identity: CType::SizeT, usize, [0, 4096, usize::MAX];
    #[cfg(not(windows))]
    int128_identity: CType::Int128, i128,
        [0, -1, 0x0123456789ABCDEF_FEDCBA9876543210_u128 as i128, i128::MIN, i128::MAX];
    #[cfg(not(windows))]
    uint128_identity: CType::UInt128, u128, [0, 0x0123456789ABCDEF_FEDCBA9876543210, u128::MAX];
}

#[test]
fn pointer_identity_null_and_not() {
    extern "C" fn identity(p: *const u8) -> *const u8 {
        p
    }
    let f: extern "C" fn(*const u8) -> *const u8 = identity;
    let t = trampoline("pointer_identity", CType::Pointer, &[CType::Pointer], f as usize);

    let null: *const u8 = std::ptr::null();
    let got: *const u8 = unsafe { call(&t, &[Arg::from_ref(&null)]) };
    assert!(got.is_null());

    // A fabricated non-null address; it is round-tripped, never dereferenced.
    let bogus = 0xDEAD_BEE0_usize as *const u8;
    let got: *const u8 = unsafe { call(&t, &[Arg::from_ref(&bogus)]) };
    assert_eq!(got, bogus);
}

#[test]
fn add_two_ints() {
    extern "C" fn add(a: i32, b: i32) -> i32 {
        a.wrapping_add(b)
    }
    let f: extern "C" fn(i32, i32) -> i32 = add;
    let t = trampoline("add_two_ints", CType::Int, &[CType::Int; 2], f as usize);
    let (a, b) = (2_i32, 40_i32);
    assert_eq!(unsafe { call::<i32>(&t, &[Arg::from_ref(&a), Arg::from_ref(&b)]) }, 42);
    let (a, b) = (i32::MAX, 1_i32);
    assert_eq!(
        unsafe { call::<i32>(&t, &[Arg::from_ref(&a), Arg::from_ref(&b)]) },
        i32::MIN
    );
}

#[test]
fn sum_seven_ints_fills_the_register_bank() {
    extern "C" fn sum7(a: i32, b: i32, c: i32, d: i32, e: i32, f: i32, g: i32) -> i32 {
        a + b + c + d + e + f + g
    }
    let f: extern "C" fn(i32, i32, i32, i32, i32, i32, i32) -> i32 = sum7;
    let t = trampoline("sum_seven_ints", CType::Int, &[CType::Int; 7], f as usize);
    let vals: Vec<i32> = (1..=7).collect();
    let args: Vec<Arg> = vals.iter().map(Arg::from_ref).collect();
    assert_eq!(unsafe { call::<i32>(&t, &args) }, 28);
}

#[test]
fn sum_eight_ints_spills_to_the_stack() {
    extern "C" fn sum8(a: i32, b: i32, c: i32, d: i32, e: i32, f: i32, g: i32, h: i32) -> i32 {
        a + b + c + d + e + f + g + h
    }
    let f: extern "C" fn(i32, i32, i32, i32, i32, i32, i32, i32) -> i32 = sum8;
    let t = trampoline("sum_eight_ints", CType::Int, &[CType::Int; 8], f as usize);
    let vals: Vec<i32> = (1..=8).collect();
    let args: Vec<Arg> = vals.iter().map(Arg::from_ref).collect();
    assert_eq!(unsafe { call::<i32>(&t, &args) }, 36);
}

#[test]
fn sum_nine_doubles_spills_the_fp_bank() {
    extern "C" fn sum9d(
        a: f64,
        b: f64,
        c: f64,
        d: f64,
        e: f64,
        f: f64,
        g: f64,
        h: f64,
        i: f64,
    ) -> f64 {
        a + b + c + d + e + f + g + h + i
    }
    let f: extern "C" fn(f64, f64, f64, f64, f64, f64, f64, f64, f64) -> f64 = sum9d;
    let t = trampoline("sum_nine_doubles", CType::Double, &[CType::Double; 9], f as usize);
    let vals: Vec<f64> = (1..=9).map(f64::from).collect();
    let args: Vec<Arg> = vals.iter().map(Arg::from_ref).collect();
    assert_eq!(unsafe { call::<f64>(&t, &args) }, 45.0);
}

#[test]
fn mixed_gpr_fpr_and_stack_arguments() {
    #[allow(clippy::too_many_arguments)]
    extern "C" fn mixed(
        i1: i32,
        i2: i32,
        i3: i32,
        i4: i32,
        i5: i32,
        i6: i32,
        f1: f32,
        f2: f32,
        f3: f32,
        f4: f32,
        f5: f32,
        f6: f32,
        f7: f32,
        f8: f32,
        i7: i32,
        d: f64,
    ) -> i32 {
        let ints = i1 + i2 + i3 + i4 + i5 + i6 + i7;
        let floats = f1 + f2 + f3 + f4 + f5 + f6 + f7 + f8;
        ints + floats as i32 + d as i32
    }
    #[allow(clippy::type_complexity)]
    let f: extern "C" fn(
        i32, i32, i32, i32, i32, i32,
        f32, f32, f32, f32, f32, f32, f32, f32,
        i32, f64,
    ) -> i32 = mixed;

    let mut params = vec![CType::Int; 6];
    params.extend([CType::Float; 8]);
    params.push(CType::Int);
    params.push(CType::Double);
    let t = trampoline("mixed_spill", CType::Int, &params, f as usize);

    let ints: Vec<i32> = (1..=6).collect();
    let floats: Vec<f32> = (1..=8).map(|v| v as f32).collect();
    let trailing_int = 7_i32;
    let trailing_double = 9.0_f64;
    let mut args: Vec<Arg> = ints.iter().map(Arg::from_ref).collect();
    args.extend(floats.iter().map(Arg::from_ref));
    args.push(Arg::from_ref(&trailing_int));
    args.push(Arg::from_ref(&trailing_double));

    assert_eq!(unsafe { call::<i32>(&t, &args) }, 73);
}

#[test]
fn mixed_int_float_pointer() {
    extern "C" fn mixed(i: i32, f: f32, p: *const u8) -> i32 {
        i + f as i32 + i32::from(!p.is_null())
    }
    let f: extern "C" fn(i32, f32, *const u8) -> i32 = mixed;
    let t = trampoline(
        "mixed_int_float_ptr",
        CType::Int,
        &[CType::Int, CType::Float, CType::Pointer],
        f as usize,
    );
    let (i, fl) = (10_i32, 2.5_f32);
    let p = &i as *const i32 as *const u8;
    let got: i32 = unsafe { call(&t, &[Arg::from_ref(&i), Arg::from_ref(&fl), Arg::from_ref(&p)]) };
    assert_eq!(got, 13);
}

#[test]
fn mixed_double_char_int() {
    extern "C" fn mixed(d: f64, c: u8, i: i32) -> f64 {
        d + f64::from(c) + f64::from(i)
    }
    let f: extern "C" fn(f64, u8, i32) -> f64 = mixed;
    let t = trampoline(
        "mixed_double_char_int",
        CType::Double,
        &[CType::Double, CType::Char, CType::Int],
        f as usize,
    );
    let (d, c, i) = (0.5_f64, 2_u8, 40_i32);
    let got: f64 =
        unsafe { call(&t, &[Arg::from_ref(&d), Arg::from_ref(&c), Arg::from_ref(&i)]) };
    assert_eq!(got, 42.5);
}

#[test]
fn return_constant_ignores_arguments() {
    extern "C" fn constant(_a: i32, _b: i32) -> i32 {
        42
    }
    let f: extern "C" fn(i32, i32) -> i32 = constant;
    let t = trampoline("return_constant", CType::Int, &[CType::Int; 2], f as usize);
    let (a, b) = (7_i32, 8_i32);
    assert_eq!(unsafe { call::<i32>(&t, &[Arg::from_ref(&a), Arg::from_ref(&b)]) }, 42);
}

static VOID_SINK: AtomicI32 = AtomicI32::new(0);

#[test]
fn void_call_with_two_ints() {
    extern "C" fn record(a: i32, b: i32) {
        VOID_SINK.store(a + b, Ordering::SeqCst);
    }
    let f: extern "C" fn(i32, i32) = record;
    let t = trampoline("void_two_ints", CType::Void, &[CType::Int; 2], f as usize);
    let (a, b) = (50_i32, 75_i32);
    unsafe { t.invoke(&[Arg::from_ref(&a), Arg::from_ref(&b)], None).unwrap() };
    assert_eq!(VOID_SINK.load(Ordering::SeqCst), 125);
}

#[test]
fn narrow_return_leaves_the_rest_of_the_buffer_untouched() {
    extern "C" fn identity(v: i8) -> i8 {
        v
    }
    let f: extern "C" fn(i8) -> i8 = identity;
    let t = trampoline("schar_width", CType::SChar, &[CType::SChar], f as usize);
    let v = -5_i8;
    let mut ret = RetValue::filled(0xAA);
    unsafe { t.invoke(&[Arg::from_ref(&v)], Some(&mut ret)).unwrap() };
    assert_eq!(ret.bytes()[0], (-5_i8) as u8);
    assert!(ret.bytes()[1..].iter().all(|&b| b == 0xAA));
}

#[test]
fn repeated_invocations_match_direct_calls() {
    extern "C" fn square(v: i32) -> i32 {
        v * v
    }
    let f: extern "C" fn(i32) -> i32 = square;
    let t = trampoline("square", CType::Int, &[CType::Int], f as usize);
    for v in [-9_i32, -1, 0, 3, 1000] {
        assert_eq!(unsafe { call::<i32>(&t, &[Arg::from_ref(&v)]) }, square(v));
    }
}

#[test]
fn mutating_a_cell_between_invocations_changes_only_later_calls() {
    extern "C" fn identity(v: i32) -> i32 {
        v
    }
    let f: extern "C" fn(i32) -> i32 = identity;
    let t = trampoline("cell_mutation", CType::Int, &[CType::Int], f as usize);
    let mut v = 1_i32;
    let args = [Arg::from_ref(&v)];
    assert_eq!(unsafe { call::<i32>(&t, &args) }, 1);
    v = 99;
    let args = [Arg::from_ref(&v)];
    assert_eq!(unsafe { call::<i32>(&t, &args) }, 99);
    // The trampoline only reads the caller's storage.
    assert_eq!(v, 99);
}

#[test]
fn one_trampoline_invoked_from_many_threads() {
    extern "C" fn add(a: i32, b: i32) -> i32 {
        a + b
    }
    let f: extern "C" fn(i32, i32) -> i32 = add;
    let t = Arc::new(trampoline("threaded_add", CType::Int, &[CType::Int; 2], f as usize));

    let handles: Vec<_> = (0..4)
        .map(|thread| {
            let t = Arc::clone(&t);
            std::thread::spawn(move || {
                for i in 0..200 {
                    let (a, b) = (thread * 1000, i);
                    let got: i32 = unsafe { call(&t, &[Arg::from_ref(&a), Arg::from_ref(&b)]) };
                    assert_eq!(got, a + b);
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }
}

#[test]
fn argument_count_mismatch_fails_without_calling() {
    extern "C" fn add(a: i32, b: i32) -> i32 {
        a + b
    }
    let f: extern "C" fn(i32, i32) -> i32 = add;
    let t = trampoline("count_mismatch", CType::Int, &[CType::Int; 2], f as usize);
    let a = 1_i32;
    let mut ret = RetValue::new();
    let err = unsafe { t.invoke(&[Arg::from_ref(&a)], Some(&mut ret)) }.unwrap_err();
    assert!(matches!(
        err,
        Error::ArgCountMismatch {
            expected: 2,
            got: 1
        }
    ));
}

#[test]
fn return_buffer_must_match_voidness() {
    extern "C" fn nothing() {}
    let f: extern "C" fn() = nothing;
    let t = trampoline("void_ret", CType::Void, &[], f as usize);
    let mut ret = RetValue::new();
    let err = unsafe { t.invoke(&[], Some(&mut ret)) }.unwrap_err();
    assert!(matches!(err, Error::ReturnBufferMismatch));

    extern "C" fn one() -> i32 {
        1
    }
    let g: extern "C" fn() -> i32 = one;
    let t = trampoline("nonvoid_ret", CType::Int, &[], g as usize);
    let err = unsafe { t.invoke(&[], None) }.unwrap_err();
    assert!(matches!(err, Error::ReturnBufferMismatch));
}

#[test]
fn oversized_signature_fails_construction() {
    init();
    let sig = Signature::new("too_big", CType::Void, vec![CType::Int; 60], 0);
    match Trampoline::new(sig) {
        Err(Error::CodeTooLarge { capacity }) => assert_eq!(capacity, 512),
        other => panic!("expected CodeTooLarge, got {:?}", other.map(|t| t.code_len())),
    }
}

#[test]
fn hand_written_body_is_installed_verbatim() {
    init();
    #[cfg(target_arch = "x86_64")]
    let body = [0xC3_u8]; // ret
    #[cfg(target_arch = "aarch64")]
    let body = 0xD65F03C0_u32.to_le_bytes(); // ret
    let sig = Signature::new("noop", CType::Void, vec![], 0);
    let t = unsafe { Trampoline::with_body(sig, &body).unwrap() };
    assert_eq!(t.code_len(), body.len());
    unsafe { t.invoke(&[], None).unwrap() };

    let sig = Signature::new("too_big", CType::Void, vec![], 0);
    match unsafe { Trampoline::with_body(sig, &[0_u8; 1024]) } {
        Err(Error::CodeTooLarge { capacity }) => assert_eq!(capacity, 512),
        _ => panic!("expected CodeTooLarge"),
    }
}

#[test]
fn emitted_body_fits_the_reservation() {
    extern "C" fn nothing() {}
    let f: extern "C" fn() = nothing;
    let t = trampoline("body_len", CType::Void, &[], f as usize);
    assert!(t.code_len() > 0);
    assert!(t.code_len() <= 512);
    assert_eq!(t.signature().name(), "body_len");
}
