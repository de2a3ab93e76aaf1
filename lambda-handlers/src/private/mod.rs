use std::any::Any;

pub mod encoding;

/// Extract the panic string after catching a panic, or hand back the payload if it isn't one.
pub fn panic_string(panic: Box<dyn Any + Send>) -> Result<String, Box<dyn Any + Send>> {
  panic
    .downcast::<String>()
    .map(|panic| *panic)
    .or_else(|panic| panic.downcast::<&str>().map(|message| message.to_string()))
}
