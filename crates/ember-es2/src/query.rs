//! Occlusion queries, gated by
//! [`DeviceCapabilities::supports_occlusion_queries`](crate::caps::DeviceCapabilities).
//!
//! On unsupported devices (the common ES2 case) queries are inert: begin/end
//! do nothing and results report one visible pixel so occlusion culling
//! degrades to "everything visible" rather than "everything hidden".

use ember_gl::{consts, GlEs2};
use hashbrown::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OcclusionQueryHandle(u32);

#[derive(Debug)]
struct QuerySlot {
    name: u32,
    result: u32,
    result_cached: bool,
}

#[derive(Debug)]
pub struct OcclusionQueryPool {
    supported: bool,
    queries: HashMap<u32, QuerySlot>,
    active: Option<u32>,
    next_id: u32,
}

impl OcclusionQueryPool {
    pub fn new(supported: bool) -> Self {
        Self { supported, queries: HashMap::new(), active: None, next_id: 0 }
    }

    pub fn create(&mut self, gl: &dyn GlEs2) -> OcclusionQueryHandle {
        self.next_id += 1;
        let name = if self.supported { gl.gen_query() } else { 0 };
        self.queries
            .insert(self.next_id, QuerySlot { name, result: 0, result_cached: false });
        OcclusionQueryHandle(self.next_id)
    }

    pub fn destroy(&mut self, gl: &dyn GlEs2, handle: OcclusionQueryHandle) {
        if let Some(slot) = self.queries.remove(&handle.0) {
            if slot.name != 0 {
                gl.delete_query(slot.name);
            }
        }
    }

    pub fn reset(&mut self, handle: OcclusionQueryHandle) {
        if let Some(slot) = self.queries.get_mut(&handle.0) {
            slot.result_cached = false;
        }
    }

    pub fn begin(&mut self, gl: &dyn GlEs2, handle: OcclusionQueryHandle) {
        if !self.supported {
            return;
        }
        // Queries cannot nest on ES2; close any leaked scope first.
        if self.active.is_some() {
            gl.end_query(consts::ANY_SAMPLES_PASSED_EXT);
        }
        if let Some(slot) = self.queries.get_mut(&handle.0) {
            gl.begin_query(consts::ANY_SAMPLES_PASSED_EXT, slot.name);
            slot.result_cached = false;
            self.active = Some(handle.0);
        }
    }

    pub fn end(&mut self, gl: &dyn GlEs2) {
        if !self.supported {
            return;
        }
        if self.active.take().is_some() {
            gl.end_query(consts::ANY_SAMPLES_PASSED_EXT);
        }
    }

    /// Poll a query result. With `wait == false` this never blocks: when the
    /// driver has not finished, it returns `false` and the caller retries
    /// next frame.
    pub fn get_result(
        &mut self,
        gl: &dyn GlEs2,
        handle: OcclusionQueryHandle,
        wait: bool,
    ) -> (u32, bool) {
        if !self.supported {
            // Everything passes; occlusion culling is disabled on this tier.
            return (1, true);
        }
        let Some(slot) = self.queries.get_mut(&handle.0) else {
            return (0, false);
        };
        if slot.result_cached {
            return (slot.result, true);
        }
        if wait || gl.query_result_available(slot.name) {
            slot.result = gl.query_result(slot.name);
            slot.result_cached = true;
            (slot.result, true)
        } else {
            (0, false)
        }
    }

    pub fn release_gpu_resources(&mut self, gl: &dyn GlEs2) {
        for slot in self.queries.values_mut() {
            if slot.name != 0 {
                gl.delete_query(slot.name);
                slot.name = 0;
            }
            slot.result_cached = false;
        }
        self.active = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ember_gl::TraceGl;

    #[test]
    fn unsupported_devices_report_everything_visible() {
        let gl = TraceGl::new();
        let mut pool = OcclusionQueryPool::new(false);
        let q = pool.create(&gl);
        pool.begin(&gl, q);
        pool.end(&gl);
        assert_eq!(pool.get_result(&gl, q, false), (1, true));
        assert_eq!(gl.total_calls(), 0);
    }

    #[test]
    fn nonblocking_poll_retries_until_available() {
        let gl = TraceGl::new();
        let mut pool = OcclusionQueryPool::new(true);
        let q = pool.create(&gl);
        pool.begin(&gl, q);
        pool.end(&gl);

        gl.delay_query_results(1);
        assert_eq!(pool.get_result(&gl, q, false), (0, false));
        let (result, ready) = pool.get_result(&gl, q, false);
        assert!(ready);
        assert_eq!(result, 1);
        // Cached now; no further driver traffic.
        let calls = gl.total_calls();
        assert_eq!(pool.get_result(&gl, q, false), (1, true));
        assert_eq!(gl.total_calls(), calls);
    }

    #[test]
    fn blocking_poll_fetches_immediately() {
        let gl = TraceGl::new();
        let mut pool = OcclusionQueryPool::new(true);
        let q = pool.create(&gl);
        pool.begin(&gl, q);
        pool.end(&gl);
        gl.delay_query_results(5);
        assert_eq!(pool.get_result(&gl, q, true), (1, true));
    }
}
