// Work items carried by the priority queues
//
// A slot holds either a raw (signal, param) pair for a custom consumer,
// a plain callback that needs no allocation, or an owned closure.
// The variant tag replaces the "is this word a function pointer or a
// heap address" convention, so the ISR path never touches the heap.

use alloc::boxed::Box;
use core::alloc::Layout;
use core::fmt;

/// Plain callback with one word of context. Safe to queue from an ISR.
pub type TaskCallback = fn(usize);

/// Parameterless callback. Safe to queue from an ISR.
pub type InterruptCallback = fn();

/// A long-lived object that can be scheduled by reference.
///
/// `param` lets one object expose several entry points without
/// allocating a closure per post.
pub trait Deferred: Sync {
    fn run(&'static self, param: usize);
}

/// Allocation-free deferred call.
#[derive(Clone, Copy)]
pub enum Callback {
    Call(TaskCallback, usize),
    Interrupt(InterruptCallback),
    Object(&'static dyn Deferred, usize),
}

impl Callback {
    pub fn invoke(self) {
        match self {
            Callback::Call(func, param) => func(param),
            Callback::Interrupt(func) => func(),
            Callback::Object(obj, param) => obj.run(param),
        }
    }
}

impl fmt::Debug for Callback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Callback::Call(func, param) => {
                write!(f, "Call({:p}, {:#x})", *func as *const (), param)
            }
            Callback::Interrupt(func) => write!(f, "Interrupt({:p})", *func as *const ()),
            Callback::Object(obj, param) => {
                write!(f, "Object({:p}, {:#x})", *obj as *const dyn Deferred as *const (), param)
            }
        }
    }
}

/// One queue slot.
pub enum Event {
    /// Opaque pair interpreted by the priority's consumer.
    Signal { signal: u32, param: usize },
    Callback(Callback),
    /// Heap-owned closure; invoked once then freed.
    Closure(Box<dyn FnOnce() + Send>),
}

impl Event {
    pub const fn signal(signal: u32, param: usize) -> Self {
        Event::Signal { signal, param }
    }

    /// Box a closure without aborting on allocation failure.
    pub fn closure<F>(f: F) -> Option<Self>
    where
        F: FnOnce() + Send + 'static,
    {
        let boxed = try_box(f)?;
        Some(Event::Closure(boxed))
    }

    /// Run callback and closure variants. Raw signals are returned to
    /// the caller untouched.
    pub fn run(self) -> Option<(u32, usize)> {
        match self {
            Event::Signal { signal, param } => Some((signal, param)),
            Event::Callback(cb) => {
                cb.invoke();
                None
            }
            Event::Closure(f) => {
                f();
                None
            }
        }
    }

    pub fn is_closure(&self) -> bool {
        matches!(self, Event::Closure(_))
    }
}

impl From<Callback> for Event {
    fn from(cb: Callback) -> Self {
        Event::Callback(cb)
    }
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::Signal { signal, param } => write!(f, "Signal({}, {:#x})", signal, param),
            Event::Callback(cb) => write!(f, "{:?}", cb),
            Event::Closure(_) => write!(f, "Closure"),
        }
    }
}

/// Fallible `Box::new`: returns `None` instead of aborting when the
/// allocator is out of memory.
pub fn try_box<T>(value: T) -> Option<Box<T>> {
    let layout = Layout::new::<T>();
    if layout.size() == 0 {
        // zero-sized values never touch the allocator
        return Some(Box::new(value));
    }
    // SAFETY: layout has non-zero size
    let ptr = unsafe { alloc::alloc::alloc(layout) }.cast::<T>();
    if ptr.is_null() {
        return None;
    }
    // SAFETY: ptr is non-null, properly aligned for T and allocated with
    // the global allocator using T's layout, which is what Box expects.
    unsafe {
        ptr.write(value);
        Some(Box::from_raw(ptr))
    }
}

/// Consumer installed on the callback priority.
pub fn dispatch_callback(event: Event) {
    if let Some((signal, param)) = event.run() {
        log::warn!(
            "callback queue: stray raw signal {} (param {:#x}) ignored",
            signal,
            param
        );
    }
}
