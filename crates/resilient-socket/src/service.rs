use std::task::{Context, Poll};

use futures::future::{ready, Ready};
use tower::Service;

use crate::error::Error;
use crate::socket::ReconnectingSocket;
use crate::transport::Message;

/// Sends each request through the live socket.
///
/// The service stays ready while the connection is being re-established, so a
/// call made between sockets fails with [`Error::NotConnected`] instead of
/// waiting. Once the socket is closed for good, `poll_ready` fails with
/// [`Error::Terminated`].
impl Service<Message> for ReconnectingSocket {
    type Response = ();
    type Error = Error;
    type Future = Ready<Result<(), Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        if self.state().is_terminated() {
            Poll::Ready(Err(Error::Terminated))
        } else {
            Poll::Ready(Ok(()))
        }
    }

    fn call(&mut self, message: Message) -> Self::Future {
        ready(self.send(message))
    }
}
