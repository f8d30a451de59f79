use super::*;
use crate::registry::Hook;

type UnaryFn = dyn Fn(u32) -> u32 + Send + Sync;
type GreetFn = dyn Fn(&str) -> String + Send + Sync;

const UNARY_SIG: &str = "dyn Fn(u32) -> u32 + Send + Sync";

/// Declares an un-gated function with its own flag and definition.
macro_rules! unary_def {
	($def:ident, $flag:ident, $func:ident, $name:literal, $body:expr) => {
		static $flag: Flag = Flag::new();
		static $def: FnDef = FnDef {
			name: $name,
			signature: UNARY_SIG,
			flag: &$flag,
			hook: || {
				Hook::new::<UnaryFn, fn(u32) -> u32>(FnId::new($func as *const () as usize), Box::new($func), |f| {
					Box::new(f) as Box<UnaryFn>
				})
			},
		};
		fn $func(x: u32) -> u32 {
			$body(x)
		}
	};
}

unary_def!(DOUBLE, DOUBLE_FLAG, double, "unit/double", |x| x * 2);
unary_def!(TRIPLE, TRIPLE_FLAG, triple, "unit/triple", |x| x * 3);
unary_def!(SQUARE, SQUARE_FLAG, square, "unit/square", |x| x * x);
unary_def!(HALVE, HALVE_FLAG, halve, "unit/halve", |x| x / 2);
unary_def!(NEGATE, NEGATE_FLAG, negate, "unit/negate", |x: u32| x.wrapping_neg());
unary_def!(INCR, INCR_FLAG, incr, "unit/incr", |x| x + 1);

macro_rules! greet_def {
	($def:ident, $flag:ident, $func:ident, $name:literal) => {
		static $flag: Flag = Flag::new();
		static $def: FnDef = FnDef {
			name: $name,
			signature: "dyn Fn(&str) -> String + Send + Sync",
			flag: &$flag,
			hook: || {
				Hook::new::<GreetFn, fn(&str) -> String>(FnId::new($func as *const () as usize), Box::new($func), |f| {
					Box::new(f) as Box<GreetFn>
				})
			},
		};
		fn $func(name: &str) -> String {
			format!("hello {name}")
		}
	};
}

greet_def!(GREET, GREET_FLAG, greet, "unit/greet");
greet_def!(WELCOME, WELCOME_FLAG, welcome, "unit/welcome");

fn call(interceptor: &Interceptor, id: FnId, original: fn(u32) -> u32, x: u32) -> u32 {
	match interceptor.lookup::<UnaryFn>(id) {
		Some(replacement) => (*replacement)(x),
		None => original(x),
	}
}

#[test]
fn register_and_resolve() {
	let interceptor = Interceptor::new();
	let id = interceptor.register(&DOUBLE);
	assert_eq!(id, FnId::new(double as *const () as usize));
	assert_eq!(interceptor.resolve("unit/double").unwrap(), id);
	assert_eq!(interceptor.registered_names(), vec!["unit/double"]);

	let original = interceptor.original_of::<UnaryFn>(id).unwrap();
	assert_eq!((*original)(21), 42);
}

#[test]
fn mock_reset_round_trip() {
	let interceptor = Interceptor::new();
	let id = interceptor.register(&TRIPLE);
	assert_eq!(call(&interceptor, id, triple, 2), 6);

	interceptor.install::<UnaryFn>(id, Box::new(|x| x + 100)).unwrap();
	assert!(TRIPLE_FLAG.is_set());
	assert!(interceptor.is_mocked(id));
	assert_eq!(call(&interceptor, id, triple, 2), 102);

	interceptor.remove(id);
	assert!(!TRIPLE_FLAG.is_set());
	assert!(!interceptor.is_mocked("unit/triple"));
	assert_eq!(call(&interceptor, id, triple, 2), 6);
}

#[test]
fn install_by_name_overwrites_whole_entry() {
	let interceptor = Interceptor::new();
	let id = interceptor.register(&SQUARE);
	interceptor.install::<UnaryFn>("unit/square", Box::new(|_| 1)).unwrap();
	interceptor.install::<UnaryFn>("unit/square", Box::new(|_| 2)).unwrap();
	assert_eq!(interceptor.mock_count(), 1);
	assert_eq!(call(&interceptor, id, square, 9), 2);
	interceptor.remove("unit/square");
}

#[test]
fn reset_all_clears_every_flag() {
	let interceptor = Interceptor::new();
	interceptor.register(&HALVE);
	interceptor.register(&NEGATE);
	interceptor.install::<UnaryFn>("unit/halve", Box::new(|x| x)).unwrap();
	interceptor.install::<UnaryFn>("unit/negate", Box::new(|x| x)).unwrap();

	assert_eq!(interceptor.remove_all(), 2);
	assert_eq!(interceptor.mock_count(), 0);
	assert!(!HALVE_FLAG.is_set());
	assert!(!NEGATE_FLAG.is_set());
	assert!(interceptor.lookup::<UnaryFn>(FnId::new(halve as *const () as usize)).is_none());
}

#[test]
fn signature_mismatch_installs_nothing() {
	let interceptor = Interceptor::new();
	interceptor.register(&GREET);
	let err = interceptor
		.install::<UnaryFn>("unit/greet", Box::new(|x| x))
		.unwrap_err();
	assert!(matches!(err, Error::SignatureMismatch { ref name, .. } if name == "unit/greet"));
	assert_eq!(interceptor.mock_count(), 0);
	assert!(!GREET_FLAG.is_set());
}

#[test]
fn unregistered_target_is_rejected() {
	let interceptor = Interceptor::new();
	let err = interceptor
		.install::<UnaryFn>("unit/missing", Box::new(|x| x))
		.unwrap_err();
	assert!(matches!(err, Error::NotRegistered(ref name) if name == "unit/missing"));
	assert!(matches!(interceptor.resolve("unit/missing"), Err(Error::NotRegistered(_))));
	assert!(matches!(
		interceptor.call_original::<UnaryFn, _>("unit/missing", |f| f(1)),
		Err(Error::NotRegistered(_))
	));
	assert_eq!(interceptor.mock_count(), 0);

	// Removing something unknown is a no-op.
	interceptor.remove("unit/missing");
	interceptor.remove(FnId::new(1));
}

#[test]
fn call_original_suspends_flag() {
	let interceptor = Interceptor::new();
	let id = interceptor.register(&INCR);
	interceptor.install::<UnaryFn>(id, Box::new(|_| 0)).unwrap();

	let observed = interceptor
		.call_original::<UnaryFn, _>(id, |original| (INCR_FLAG.is_set(), original(41)))
		.unwrap();
	assert_eq!(observed, (false, 42));
	assert!(INCR_FLAG.is_set());
	assert!(interceptor.is_mocked(id));
	interceptor.remove(id);
}

#[test]
fn raw_install_checks_signature_text() {
	let interceptor = Interceptor::new();
	interceptor.register(&WELCOME);

	fn shout(name: &str) -> String {
		format!("HELLO {name}")
	}
	let raw = shout as fn(&str) -> String as *const ();

	// SAFETY: `shout` has the registered shape.
	let err = unsafe { interceptor.install_raw("unit/welcome", UNARY_SIG, raw) }.unwrap_err();
	assert!(matches!(err, Error::SignatureMismatch { .. }));
	assert_eq!(interceptor.mock_count(), 0);
	assert!(!WELCOME_FLAG.is_set());

	// SAFETY: as above.
	unsafe { interceptor.install_raw("unit/welcome", WELCOME.signature, raw) }.unwrap();
	assert!(WELCOME_FLAG.is_set());
	let replacement = interceptor.lookup::<GreetFn>(FnId::new(welcome as *const () as usize)).unwrap();
	assert_eq!((*replacement)("bob"), "HELLO bob");
	assert_eq!(interceptor.remove_all(), 1);
}
