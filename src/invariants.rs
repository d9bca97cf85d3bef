//! Debug assertion macros for the writer's structural invariants.
//!
//! Only active in debug builds (`#[cfg(debug_assertions)]`), so there is zero
//! overhead in release builds. The walks are O(window) and acceptable there.

// =============================================================================
// INV-WIN: active-window length always equals `size`
// =============================================================================

/// Assert that the nodes reachable from the write pointer count up to `size`.
///
/// Used in: `RingWriter` after `grow()` and `reduce()`.
macro_rules! debug_assert_window_len {
    ($ring:expr, $head:expr, $size:expr) => {
        #[cfg(debug_assertions)]
        {
            let mut n = 1usize;
            let mut p = $ring.next($head);
            while p != $head {
                n += 1;
                p = $ring.next(p);
            }
            debug_assert!(
                n == $size,
                "active window holds {} nodes but size is {}",
                n,
                $size
            );
        }
    };
}

// =============================================================================
// INV-POOL: `pool_size` equals the number of nodes reachable from the pool
// =============================================================================

/// Assert that the pool ring length matches `pool_size`.
///
/// Used in: `RingWriter` after `grow()` and `recycle()`.
macro_rules! debug_assert_pool_len {
    ($ring:expr, $pool:expr, $pool_size:expr) => {
        #[cfg(debug_assertions)]
        {
            match $pool {
                None => debug_assert!(
                    $pool_size == 0,
                    "pool is empty but pool_size is {}",
                    $pool_size
                ),
                Some(entry) => {
                    let mut n = 1usize;
                    let mut p = $ring.next(entry);
                    while p != entry {
                        n += 1;
                        p = $ring.next(p);
                    }
                    debug_assert!(
                        n == $pool_size,
                        "pool holds {} nodes but pool_size is {}",
                        n,
                        $pool_size
                    );
                }
            }
        }
    };
}

pub(crate) use debug_assert_pool_len;
pub(crate) use debug_assert_window_len;
