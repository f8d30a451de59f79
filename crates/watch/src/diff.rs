//! Line diff between a cached original and the new contents of a file.

use std::collections::BTreeSet;

/// One step of an edit script, consuming one line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineOp {
	Equal,
	Delete,
	Insert,
}

/// Shortest edit script turning `old` into `new` (Myers' O(ND) algorithm).
pub fn line_ops(old: &[&str], new: &[&str]) -> Vec<LineOp> {
	let n = old.len() as isize;
	let m = new.len() as isize;
	let max = old.len() + new.len();
	if max == 0 {
		return Vec::new();
	}

	let offset = max as isize;
	let index = |k: isize| (k + offset) as usize;
	let mut v = vec![0isize; 2 * max + 2];
	let mut trace = Vec::new();

	'search: for d in 0..=max as isize {
		trace.push(v.clone());
		let mut k = -d;
		while k <= d {
			let mut x = if k == -d || (k != d && v[index(k - 1)] < v[index(k + 1)]) {
				v[index(k + 1)]
			} else {
				v[index(k - 1)] + 1
			};
			let mut y = x - k;
			while x < n && y < m && old[x as usize] == new[y as usize] {
				x += 1;
				y += 1;
			}
			v[index(k)] = x;
			if x >= n && y >= m {
				break 'search;
			}
			k += 2;
		}
	}

	let mut ops = Vec::with_capacity(max);
	let (mut x, mut y) = (n, m);
	for (d, v) in trace.iter().enumerate().rev() {
		let d = d as isize;
		let k = x - y;
		let prev_k = if k == -d || (k != d && v[index(k - 1)] < v[index(k + 1)]) {
			k + 1
		} else {
			k - 1
		};
		let prev_x = v[index(prev_k)];
		let prev_y = prev_x - prev_k;

		while x > prev_x && y > prev_y {
			ops.push(LineOp::Equal);
			x -= 1;
			y -= 1;
		}
		if d > 0 {
			ops.push(if x == prev_x { LineOp::Insert } else { LineOp::Delete });
		}
		x = prev_x;
		y = prev_y;
	}
	ops.reverse();
	ops
}

/// 1-based lines of `new` touched by the edit from `old`.
///
/// An inserted line contributes its own number; a deletion contributes the
/// number of the new line at the deletion point.
pub fn changed_lines(old: &str, new: &str) -> BTreeSet<usize> {
	let old: Vec<&str> = old.split('\n').collect();
	let new: Vec<&str> = new.split('\n').collect();

	let mut changed = BTreeSet::new();
	let mut line = 1;
	for op in line_ops(&old, &new) {
		match op {
			LineOp::Equal => line += 1,
			LineOp::Insert => {
				changed.insert(line);
				line += 1;
			}
			LineOp::Delete => {
				changed.insert(line);
			}
		}
	}
	changed
}
