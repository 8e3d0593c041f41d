//! Assertion macros for cascade tests.

/// Assert that a result is Ok.
#[macro_export]
macro_rules! assert_ok {
    ($expr:expr) => {
        match &$expr {
            Ok(_) => (),
            Err(e) => panic!("assertion failed: expected Ok, got Err({:?})", e),
        }
    };
    ($expr:expr, $($arg:tt)+) => {
        match &$expr {
            Ok(_) => (),
            Err(e) => panic!("assertion failed: {}: expected Ok, got Err({:?})", format_args!($($arg)+), e),
        }
    };
}

/// Assert that a result is Err.
#[macro_export]
macro_rules! assert_err {
    ($expr:expr) => {
        match &$expr {
            Err(_) => (),
            Ok(v) => panic!("assertion failed: expected Err, got Ok({:?})", v),
        }
    };
    ($expr:expr, $($arg:tt)+) => {
        match &$expr {
            Err(_) => (),
            Ok(v) => panic!("assertion failed: {}: expected Err, got Ok({:?})", format_args!($($arg)+), v),
        }
    };
}

/// Assert that a result failed with `CascadeError::InvalidState`.
#[macro_export]
macro_rules! assert_invalid_state {
    ($expr:expr) => {
        match &$expr {
            Err($crate::CascadeError::InvalidState(_)) => (),
            other => panic!(
                "assertion failed: expected Err(InvalidState), got {:?}",
                other
            ),
        }
    };
}

/// Assert that a workflow's pending outbox contains an event of the given
/// type.
#[macro_export]
macro_rules! assert_event_emitted {
    ($workflow:expr, $event_type:expr) => {
        assert!(
            $workflow
                .pending_events()
                .iter()
                .any(|e| e.event_type == $event_type),
            "assertion failed: no pending '{}' event; outbox has {:?}",
            $event_type,
            $workflow
                .pending_events()
                .iter()
                .map(|e| e.event_type.clone())
                .collect::<Vec<_>>()
        )
    };
}
