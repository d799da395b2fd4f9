#[cfg(test)]
pub(crate) mod support {
    use std::net::TcpListener;

    // Address of a port nothing listens on: the listener is closed on return.
    pub(crate) fn unreachable_url() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").expect("failed to bind a local port");
        let addr = listener.local_addr().expect("bound listener has an address");
        drop(listener);
        format!("http://{}", addr)
    }
}
