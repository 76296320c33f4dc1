//! Send/Sync guarantees for core types.

use gelfhandler::{
    DeliveryFailure, Dispatcher, GelfConfig, GelfError, GelfHandler, GelfHandlerBuilder,
    GelfLogRecord, GelfMessage, HandlerError, MessageBuilder, SendJob, SeverityRegistry,
};
use rstest::rstest;
use static_assertions::assert_impl_all;

#[rstest]
fn builders_are_send_sync() {
    assert_impl_all!(GelfHandlerBuilder: Send, Sync, Clone);
    assert_impl_all!(GelfConfig: Send, Sync, Clone);
    assert_impl_all!(MessageBuilder: Send, Sync);
}

#[rstest]
fn components_are_send_sync() {
    assert_impl_all!(GelfHandler: Send, Sync);
    assert_impl_all!(Dispatcher: Send, Sync);
    assert_impl_all!(SeverityRegistry: Send, Sync);
    assert_impl_all!(GelfLogRecord: Send, Sync);
    assert_impl_all!(GelfMessage: Send, Sync);
}

#[rstest]
fn jobs_and_errors_cross_threads() {
    assert_impl_all!(SendJob: Send);
    assert_impl_all!(GelfError: Send, Sync, std::error::Error);
    assert_impl_all!(HandlerError: Send, Sync, std::error::Error);
    assert_impl_all!(DeliveryFailure: Send, Sync);
}
