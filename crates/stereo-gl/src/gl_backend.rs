//! OpenGL function loading for the context the shell made current.

use std::sync::Once;

/// Resolve the `gl` entry points through `gl_loader`. Later calls, from any
/// device, are no-ops.
pub fn load_gl_functions() {
    static LOADED: Once = Once::new();
    LOADED.call_once(|| {
        gl_loader::init_gl();
        gl::load_with(|s| gl_loader::get_proc_address(s).cast());
        tracing::debug!("loaded OpenGL function pointers");
    });
}

/// True if a context is current and the function pointers work.
pub fn is_context_current() -> bool {
    gl::GetString::is_loaded() && unsafe { !gl::GetString(gl::VERSION).is_null() }
}

/// Drain the GL error queue.
pub fn clear_gl_errors() {
    unsafe {
        while gl::GetError() != gl::NO_ERROR {}
    }
}

/// Read a GL string such as `gl::VERSION`.
pub fn gl_string(name: gl::types::GLenum) -> Option<String> {
    let ptr = unsafe { gl::GetString(name) };
    if ptr.is_null() {
        return None;
    }
    let cstr = unsafe { std::ffi::CStr::from_ptr(ptr.cast()) };
    Some(cstr.to_string_lossy().into_owned())
}
