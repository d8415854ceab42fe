//! Integration tests for the shishan library.
//!
//! These tests run a `ChatSession` over a real `ChatClient` against a small chunked
//! HTTP/1.1 server bound to localhost.

#[cfg(test)]
mod tests {
    use std::io::{self, Write};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use serde_json::{Value, json};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};
    use tokio::task::JoinHandle;

    use shishan::chat::{ChatConfig, ChatSession, TimeoutPolicy};
    use shishan::{
        ChatClient, ExchangeOutcome, HtmlRenderer, JsonLinesLogger, StreamState, TimeoutPhase,
        TurnStatus,
    };

    /// What the server does after reading the request.
    enum Script {
        /// Send each element as one HTTP chunk, then end the body.
        Chunks(Vec<Vec<u8>>),
        /// Send each element as one HTTP chunk, then wait for the client to hang up.
        ChunksThenHang(Vec<Vec<u8>>),
        /// Answer with a non-success status.
        Status(u16, &'static str),
    }

    fn text_chunks(parts: &[&str]) -> Vec<Vec<u8>> {
        parts.iter().map(|p| p.as_bytes().to_vec()).collect()
    }

    fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
        haystack
            .windows(needle.len())
            .position(|window| window == needle)
    }

    async fn read_request(socket: &mut TcpStream) -> Value {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let n = socket.read(&mut chunk).await.unwrap();
            assert!(n > 0, "client closed before sending a request");
            buf.extend_from_slice(&chunk[..n]);
            let Some(end) = find(&buf, b"\r\n\r\n") else {
                continue;
            };
            let head = String::from_utf8_lossy(&buf[..end]).to_string();
            assert!(head.starts_with("POST /getMessageWeb HTTP/1.1"), "{head}");
            assert!(
                head.to_lowercase()
                    .contains("content-type: application/json; charset=utf-8"),
                "{head}"
            );
            let length = head
                .lines()
                .filter_map(|line| line.split_once(':'))
                .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
                .and_then(|(_, value)| value.trim().parse::<usize>().ok())
                .unwrap_or(0);
            let body_start = end + 4;
            while buf.len() < body_start + length {
                let n = socket.read(&mut chunk).await.unwrap();
                assert!(n > 0, "client closed mid-body");
                buf.extend_from_slice(&chunk[..n]);
            }
            return serde_json::from_slice(&buf[body_start..body_start + length]).unwrap();
        }
    }

    async fn write_chunks(socket: &mut TcpStream, chunks: &[Vec<u8>]) -> io::Result<()> {
        socket
            .write_all(
                b"HTTP/1.1 200 OK\r\nContent-Type: text/plain; charset=utf-8\r\nTransfer-Encoding: chunked\r\n\r\n",
            )
            .await?;
        for data in chunks {
            socket
                .write_all(format!("{:x}\r\n", data.len()).as_bytes())
                .await?;
            socket.write_all(data).await?;
            socket.write_all(b"\r\n").await?;
            socket.flush().await?;
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        Ok(())
    }

    /// Serves one request and returns its URL plus a handle that yields the JSON body.
    ///
    /// For `ChunksThenHang` the handle completes only once the client closed the
    /// connection.
    async fn serve_once(script: Script) -> (String, JoinHandle<Value>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/getMessageWeb", listener.local_addr().unwrap());
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let request = read_request(&mut socket).await;
            match script {
                Script::Chunks(chunks) => {
                    write_chunks(&mut socket, &chunks).await.unwrap();
                    socket.write_all(b"0\r\n\r\n").await.unwrap();
                    socket.flush().await.unwrap();
                }
                Script::ChunksThenHang(chunks) => {
                    write_chunks(&mut socket, &chunks).await.unwrap();
                    let mut sink = [0u8; 256];
                    loop {
                        match socket.read(&mut sink).await {
                            Ok(0) | Err(_) => break,
                            Ok(_) => {}
                        }
                    }
                }
                Script::Status(status, body) => {
                    let response = format!(
                        "HTTP/1.1 {status} Error\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                        body.len()
                    );
                    socket.write_all(response.as_bytes()).await.unwrap();
                    socket.flush().await.unwrap();
                }
            }
            request
        });
        (url, handle)
    }

    fn session_for(url: &str, config: ChatConfig) -> ChatSession<ChatClient, HtmlRenderer> {
        let client = ChatClient::new(Some(url.to_string())).unwrap();
        ChatSession::new(client, HtmlRenderer::new(), config)
    }

    #[tokio::test]
    async fn streams_a_chunked_answer() {
        let (url, server) = serve_once(Script::Chunks(text_chunks(&["Hi", " there"]))).await;
        let mut session = session_for(&url, ChatConfig::new());

        let outcome = session.send("hello").await.unwrap();

        assert!(outcome.is_completed(), "{outcome:?}");
        assert_eq!(session.state(), StreamState::Idle);
        let answer = session.history().last().unwrap();
        assert_eq!(answer.content, "Hi there");
        assert_eq!(answer.status, TurnStatus::Complete);
        assert_eq!(session.renderer().html(), "<p>Hi there</p>\n");

        let request = server.await.unwrap();
        assert_eq!(request, json!({"userMessage": "hello", "history": []}));
    }

    #[tokio::test]
    async fn sends_prior_turns_as_history() {
        let (url, server) = serve_once(Script::Chunks(text_chunks(&["a2"]))).await;
        let mut session = session_for(&url, ChatConfig::new());

        // Each server answers once; feed the first exchange by hand.
        let exchange = session.submit("q1").unwrap();
        session.on_chunk(&exchange, b"a1");
        session.on_end(&exchange);
        session.send("q2").await.unwrap();

        let request = server.await.unwrap();
        assert_eq!(
            request,
            json!({
                "userMessage": "q2",
                "history": [
                    {"role": "user", "content": "q1"},
                    {"role": "assistant", "content": "a1"}
                ]
            })
        );
    }

    #[tokio::test]
    async fn multibyte_characters_split_across_http_chunks() {
        let bytes = "华中农业大学".as_bytes();
        let chunks = vec![bytes[..4].to_vec(), bytes[4..11].to_vec(), bytes[11..].to_vec()];
        let (url, _server) = serve_once(Script::Chunks(chunks)).await;
        let mut session = session_for(&url, ChatConfig::new());

        let outcome = session.send("学校叫什么").await.unwrap();

        assert!(outcome.is_completed());
        assert_eq!(session.history().last().unwrap().content, "华中农业大学");
        assert!(session.renderer().errors().is_empty());
    }

    #[tokio::test]
    async fn http_error_status_fails_the_turn() {
        let (url, _server) = serve_once(Script::Status(500, "model crashed")).await;
        let mut session = session_for(&url, ChatConfig::new());

        let outcome = session.send("hello").await.unwrap();

        match outcome {
            ExchangeOutcome::Errored(err) => {
                assert_eq!(err.status_code(), Some(500));
                assert!(err.to_string().contains("model crashed"));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        let answer = session.history().last().unwrap();
        assert_eq!(answer.content, "请求失败，请稍后再试");
        assert_eq!(answer.status, TurnStatus::Failed);
        assert_eq!(session.renderer().errors().len(), 1);
    }

    #[tokio::test]
    async fn connection_refused_fails_the_turn() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/getMessageWeb", listener.local_addr().unwrap());
        drop(listener);
        let mut session = session_for(&url, ChatConfig::new());

        let outcome = session.send("hello").await.unwrap();

        match outcome {
            ExchangeOutcome::Errored(err) => assert!(err.is_network(), "{err}"),
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(session.state(), StreamState::Idle);
    }

    #[tokio::test]
    async fn cancel_stops_the_stream_and_closes_the_connection() {
        let (url, server) =
            serve_once(Script::ChunksThenHang(text_chunks(&["Partial"]))).await;
        let mut session = session_for(&url, ChatConfig::new());
        let handle = session.cancel_handle();

        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(300)).await;
            handle.cancel()
        });
        let outcome = session.send("hello").await.unwrap();

        assert!(outcome.is_cancelled());
        assert!(canceller.await.unwrap());
        let answer = session.history().last().unwrap();
        assert_eq!(answer.content, "Partial\n\n(已停止生成)");
        assert_eq!(answer.status, TurnStatus::Cancelled);

        tokio::time::timeout(Duration::from_secs(5), server)
            .await
            .expect("server should see the connection close")
            .unwrap();
    }

    #[tokio::test]
    async fn stalled_stream_times_out() {
        let (url, _server) =
            serve_once(Script::ChunksThenHang(text_chunks(&["Partial"]))).await;
        let config = ChatConfig::new().with_timeouts(TimeoutPolicy::new(
            Duration::from_secs(5),
            Duration::from_millis(300),
        ));
        let mut session = session_for(&url, config);

        let outcome = session.send("hello").await.unwrap();

        assert!(matches!(outcome, ExchangeOutcome::TimedOut(TimeoutPhase::Stalled)));
        assert_eq!(
            session.history().last().unwrap().content,
            "Partial\n\n响应中断：长时间未收到新数据"
        );
    }

    #[tokio::test]
    async fn silent_server_times_out_before_first_byte() {
        let (url, _server) = serve_once(Script::ChunksThenHang(Vec::new())).await;
        let config = ChatConfig::new().with_timeouts(TimeoutPolicy::new(
            Duration::from_millis(300),
            Duration::from_secs(5),
        ));
        let mut session = session_for(&url, config);

        let outcome = session.send("hello").await.unwrap();

        assert!(matches!(outcome, ExchangeOutcome::TimedOut(TimeoutPhase::FirstByte)));
        assert_eq!(
            session.history().last().unwrap().content,
            "响应超时：服务器处理时间过长，请稍后重试"
        );
    }

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn json_lines_logger_records_the_exchange() {
        let (url, _server) = serve_once(Script::Chunks(text_chunks(&["Hi", " there"]))).await;
        let buf = SharedBuf::default();
        let mut session = session_for(&url, ChatConfig::new())
            .with_logger(Arc::new(JsonLinesLogger::new(buf.clone())));

        session.send("hello").await.unwrap();

        let log = String::from_utf8(buf.0.lock().unwrap().clone()).unwrap();
        let events: Vec<Value> = log
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        let kinds: Vec<&str> = events
            .iter()
            .map(|event| event["event"].as_str().unwrap())
            .collect();
        assert_eq!(kinds.first(), Some(&"transition"));
        assert!(kinds.contains(&"request"));
        assert!(kinds.contains(&"chunk"));
        let outcome = events
            .iter()
            .find(|event| event["event"] == "outcome")
            .unwrap();
        assert_eq!(outcome["outcome"], "completed");
        assert_eq!(outcome["turn"]["content"], "Hi there");
        let last = events.last().unwrap();
        assert_eq!(last["event"], "transition");
        assert_eq!(last["to"], "idle");
        assert!(events.iter().all(|event| event["exchange"] == 1));
    }
}
