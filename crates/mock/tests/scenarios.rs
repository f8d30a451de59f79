//! End-to-end behavior of instrumented code against the global interceptor.
//!
//! The functions below are written the way the source rewriter emits them.

#![allow(unused_crate_dependencies)]

use std::fs::File;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;

use hotmock::{Error, FnId};
use serial_test::serial;

type OpenFn = dyn Fn(&str) -> io::Result<File> + Send + Sync;
type IncrementFn = dyn Fn(&Counter) -> u64 + Send + Sync;

fn open(name: &str) -> io::Result<File> {
	if __HOTMOCK_FLAG_open.is_set() {
		if let Some(__hotmock) = hotmock::mock_for::<OpenFn>(FnId::new(open as *const () as usize)) {
			return (*__hotmock)(name);
		}
	}
	File::open(name)
}

pub struct Counter {
	hits: AtomicU64,
}

impl Counter {
	fn new() -> Self {
		Self { hits: AtomicU64::new(0) }
	}

	pub fn increment(&self) -> u64 {
		if __HOTMOCK_FLAG_increment.is_set() {
			if let Some(__hotmock) = hotmock::mock_for::<IncrementFn>(FnId::new(Counter::increment as *const () as usize)) {
				return (*__hotmock)(self);
			}
		}
		self.hits.fetch_add(1, Ordering::SeqCst) + 1
	}
}

hotmock::register_fn!(
	__HOTMOCK_FLAG_open,
	"scenarios/open",
	"dyn Fn(&str) -> io::Result<File> + Send + Sync",
	open,
	dyn Fn(&str) -> io::Result<File> + Send + Sync,
	fn(&str) -> io::Result<File>
);
hotmock::register_fn!(
	__HOTMOCK_FLAG_increment,
	"scenarios/*Counter.increment",
	"dyn Fn(&Counter) -> u64 + Send + Sync",
	Counter::increment,
	dyn Fn(&Counter) -> u64 + Send + Sync,
	fn(&Counter) -> u64
);

#[test]
#[serial]
fn functions_self_register() {
	let names = hotmock::Interceptor::global().registered_names();
	assert!(names.contains(&"scenarios/open"));
	assert!(names.contains(&"scenarios/*Counter.increment"));
	assert_eq!(hotmock::resolve("scenarios/open").unwrap(), FnId::new(open as *const () as usize));
}

#[test]
#[serial]
fn open_mock_and_reset() {
	hotmock::mock::<OpenFn>(
		FnId::new(open as *const () as usize),
		Box::new(|_name: &str| Err(io::Error::other("cannot open files"))),
	)
	.unwrap();
	let err = open("/dev/null").unwrap_err();
	assert_eq!(err.to_string(), "cannot open files");

	hotmock::reset(FnId::new(open as *const () as usize));
	assert!(open("/dev/null").is_ok());
}

#[test]
#[serial]
fn reset_all_restores_everything() {
	hotmock::mock::<OpenFn>("scenarios/open", Box::new(|_name: &str| Err(io::Error::other("nope")))).unwrap();
	hotmock::mock::<IncrementFn>("scenarios/*Counter.increment", Box::new(|_: &Counter| 0)).unwrap();

	hotmock::reset_all();
	assert!(open("/dev/null").is_ok());
	assert_eq!(Counter::new().increment(), 1);
}

#[test]
#[serial]
fn mismatched_replacement_is_rejected() {
	let err = hotmock::mock::<IncrementFn>("scenarios/open", Box::new(|_: &Counter| 0)).unwrap_err();
	assert!(matches!(err, Error::SignatureMismatch { .. }));
	assert!(!hotmock::Interceptor::global().is_mocked("scenarios/open"));
	assert!(open("/dev/null").is_ok());
}

#[test]
#[serial]
fn replacement_can_delegate_to_original() {
	hotmock::mock::<IncrementFn>(
		"scenarios/*Counter.increment",
		Box::new(|counter: &Counter| {
			let real = hotmock::call_original::<IncrementFn, _>("scenarios/*Counter.increment", |original| original(counter))
				.unwrap();
			real * 10
		}),
	)
	.unwrap();

	let counter = Counter::new();
	assert_eq!(counter.increment(), 10);
	assert_eq!(counter.increment(), 20);
	assert_eq!(counter.hits.load(Ordering::SeqCst), 2);

	hotmock::reset("scenarios/*Counter.increment");
	assert_eq!(counter.increment(), 3);
}

#[test]
#[serial]
fn concurrent_installers_publish_whole_replacements() {
	const ROUNDS: u64 = 2_000;

	let counter = Arc::new(Counter::new());
	let installers: Vec<_> = [100u64, 200]
		.into_iter()
		.map(|value| {
			thread::spawn(move || {
				for _ in 0..ROUNDS {
					hotmock::mock::<IncrementFn>(
						"scenarios/*Counter.increment",
						Box::new(move |_: &Counter| value),
					)
					.unwrap();
				}
			})
		})
		.collect();

	let readers: Vec<_> = (0..4)
		.map(|_| {
			let counter = Arc::clone(&counter);
			thread::spawn(move || {
				let id = FnId::new(Counter::increment as *const () as usize);
				for _ in 0..ROUNDS {
					if let Some(replacement) = hotmock::mock_for::<IncrementFn>(id) {
						let value = (*replacement)(&counter);
						assert!(value == 100 || value == 200, "torn replacement returned {value}");
					}
					let value = counter.increment();
					assert!(value == 100 || value == 200 || value <= ROUNDS * 4, "unexpected {value}");
				}
			})
		})
		.collect();

	for handle in installers.into_iter().chain(readers) {
		handle.join().unwrap();
	}

	let last = counter.increment();
	assert!(last == 100 || last == 200);
	hotmock::reset_all();
}
