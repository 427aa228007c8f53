//! End-to-end SMTP scenarios against a running server

use mailslurper::{
    Broadcaster, MailStore, MemoryStore, ServerContext, SessionConfig, SmtpServer, StorageWriter,
    Subscription,
};
use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

struct TestServer {
    addr: String,
    store: Arc<MemoryStore>,
    subscription: Subscription,
}

fn start_server(session: SessionConfig, max_workers: Option<usize>) -> TestServer {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap().to_string();

    let store = Arc::new(MemoryStore::new());
    let broadcaster = Broadcaster::default();
    let subscription = broadcaster.subscribe();

    let (mail_queue, _writer) = StorageWriter::new(store.clone(), broadcaster.clone())
        .spawn(16)
        .unwrap();
    let context = ServerContext::new(session, mail_queue, broadcaster);
    let server = match max_workers {
        Some(max) => SmtpServer::with_worker_pool(context, max),
        None => SmtpServer::new(context),
    };

    // Start server in background thread
    thread::spawn(move || {
        if let Err(e) = server.start_with_listener(listener) {
            eprintln!("Error starting server: {e}");
        }
    });

    TestServer {
        addr,
        store,
        subscription,
    }
}

fn start_test_server() -> TestServer {
    start_server(SessionConfig::default(), None)
}

struct Client {
    stream: TcpStream,
    reader: BufReader<TcpStream>,
}

impl Client {
    fn connect(addr: &str) -> Self {
        let stream = TcpStream::connect(addr).unwrap();
        stream
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();
        let reader = BufReader::new(stream.try_clone().unwrap());
        Self { stream, reader }
    }

    fn read_reply(&mut self) -> String {
        let mut line = String::new();
        self.reader.read_line(&mut line).unwrap();
        line.trim_end().to_owned()
    }

    fn send_command(&mut self, command: &str) -> String {
        self.stream
            .write_all(format!("{command}\r\n").as_bytes())
            .unwrap();
        self.stream.flush().unwrap();
        self.read_reply()
    }

    /// Sends the payload followed by the end-of-data line
    fn send_data(&mut self, payload: &str) -> String {
        self.send_command(&format!("{payload}\r\n."))
    }

    fn send_simple_mail(&mut self, from: &str, to: &str, body: &str) {
        assert!(self.read_reply().starts_with("220"));
        assert!(self.send_command("HELO me").starts_with("250"));
        assert_eq!(self.send_command(&format!("MAIL FROM:<{from}>")), "250 Ok");
        assert_eq!(self.send_command(&format!("RCPT TO:<{to}>")), "250 Ok");
        assert!(self.send_command("DATA").starts_with("354"));
        assert_eq!(
            self.send_data(&format!("Subject: Note from {from}\r\n\r\n{body}")),
            "250 Ok"
        );
        assert_eq!(self.send_command("QUIT"), "221 Bye");
    }
}

#[test]
fn test_end_to_end_capture() {
    let server = start_test_server();
    let mut client = Client::connect(&server.addr);

    assert_eq!(client.read_reply(), "220 Welcome to MailSlurper!");
    assert_eq!(
        client.send_command("HELO me"),
        "250 Hello. How very nice to meet you!"
    );
    assert_eq!(client.send_command("MAIL FROM:<a@b.com>"), "250 Ok");
    assert_eq!(client.send_command("RCPT TO:<c@d.com>"), "250 Ok");
    assert_eq!(
        client.send_command("DATA"),
        "354 End data with <CR><LF>.<CR><LF>"
    );
    assert_eq!(
        client.send_data(
            "Subject: Greetings\r\nDate: Tue, 1 Jan 2014 12:01:15 -0600 (CST)\r\n\r\nHello there!"
        ),
        "250 Ok"
    );
    assert_eq!(client.send_command("QUIT"), "221 Bye");

    let summary = server
        .subscription
        .recv_timeout(Duration::from_secs(2))
        .unwrap();
    assert_eq!(summary.from_address, "a@b.com");
    assert_eq!(summary.to_addresses, vec!["c@d.com"]);
    assert_eq!(summary.subject, "Greetings");
    assert_eq!(summary.attachment_count, 0);

    let mail = server.store.get_mail(summary.id).unwrap();
    assert_eq!(mail.from_address, "a@b.com");
    assert_eq!(mail.to_addresses, vec!["c@d.com"]);
    assert_eq!(mail.body, "Hello there!");
    assert_eq!(mail.date_sent, "2014-01-01 12:01:15");
    assert_eq!(mail.xmailer, "MailSlurper!");
    assert!(mail.attachments.is_empty());
    assert_eq!(server.store.mail_count().unwrap(), 1);
}

#[test]
fn test_multiple_recipients() {
    let server = start_test_server();
    let mut client = Client::connect(&server.addr);

    client.read_reply();
    client.send_command("EHLO client.local");
    client.send_command("MAIL FROM:<sender@example.com>");
    client.send_command("RCPT TO:<recipient1@example.com>");
    client.send_command("RCPT TO:<recipient2@example.com>");
    client.send_command("DATA");
    assert_eq!(
        client.send_data("Subject: Multiple Recipients\r\n\r\nFor both of you"),
        "250 Ok"
    );
    client.send_command("QUIT");

    let summary = server
        .subscription
        .recv_timeout(Duration::from_secs(2))
        .unwrap();
    assert_eq!(
        summary.to_addresses,
        vec!["recipient1@example.com", "recipient2@example.com"]
    );
}

#[test]
fn test_concurrent_sessions_are_isolated() {
    let server = start_test_server();
    let clients = 8;

    let handles: Vec<_> = (0..clients)
        .map(|i| {
            let addr = server.addr.clone();
            thread::spawn(move || {
                let mut client = Client::connect(&addr);
                client.send_simple_mail(
                    &format!("sender{i}@example.com"),
                    &format!("rcpt{i}@example.com"),
                    &format!("body number {i}"),
                );
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    for _ in 0..clients {
        server
            .subscription
            .recv_timeout(Duration::from_secs(2))
            .unwrap();
    }

    let mails = server.store.get_mails().unwrap();
    assert_eq!(mails.len(), clients);
    for mail in mails {
        let i = mail
            .from_address
            .trim_start_matches("sender")
            .trim_end_matches("@example.com")
            .to_owned();
        assert_eq!(mail.to_addresses, vec![format!("rcpt{i}@example.com")]);
        assert_eq!(mail.body, format!("body number {i}"));
        assert_eq!(mail.subject, format!("Note from sender{i}@example.com"));
    }
}

#[test]
fn test_idle_session_times_out() {
    let session = SessionConfig {
        command_timeout_ms: 300,
        ..SessionConfig::default()
    };
    let server = start_server(session, None);
    let mut client = Client::connect(&server.addr);

    client.read_reply();
    client.send_command("HELO me");
    client.send_command("MAIL FROM:<a@b.com>");

    assert!(client.read_reply().starts_with("421"));
    assert_eq!(client.read_reply(), "221 Bye");

    assert!(
        server
            .subscription
            .recv_timeout(Duration::from_millis(200))
            .is_err()
    );
    assert_eq!(server.store.mail_count().unwrap(), 0);
}

#[test]
fn test_multipart_with_attachment() {
    let server = start_test_server();
    let mut client = Client::connect(&server.addr);

    client.read_reply();
    client.send_command("HELO me");
    client.send_command("MAIL FROM:<reports@example.com>");
    client.send_command("RCPT TO:<boss@example.com>");
    client.send_command("DATA");

    let payload = "Subject: Monthly report\r\n\
        X-Mailer: ReportBot 2.0\r\n\
        MIME-Version: 1.0\r\n\
        Content-Type: multipart/mixed;\r\n\tboundary=\"==report==\"\r\n\
        \r\n\
        This is a multi-part message in MIME format.\r\n\
        --==report==\r\n\
        Content-Type: text/plain; charset=utf-8\r\n\
        \r\n\
        Numbers attached.\r\n\
        --==report==\r\n\
        Content-Type: text/html; charset=utf-8\r\n\
        \r\n\
        <p>Numbers attached.</p>\r\n\
        --==report==\r\n\
        Content-Type: text/csv; name=\"report.csv\"\r\n\
        Content-Transfer-Encoding: base64\r\n\
        Content-Disposition: attachment; filename=\"report.csv\"\r\n\
        \r\n\
        bW9udGgsdG90YWwKamFuLDQy\r\n\
        --==report==--";
    assert_eq!(client.send_data(payload), "250 Ok");
    client.send_command("QUIT");

    let summary = server
        .subscription
        .recv_timeout(Duration::from_secs(2))
        .unwrap();
    assert_eq!(summary.attachment_count, 1);
    assert_eq!(summary.xmailer, "ReportBot 2.0");

    let mail = server.store.get_mail(summary.id).unwrap();
    assert_eq!(mail.content_type, "multipart/mixed");
    assert_eq!(mail.boundary, "==report==");
    assert_eq!(mail.body, "<p>Numbers attached.</p>");

    let attachment = &mail.attachments[0];
    assert_eq!(attachment.headers.file_name, "report.csv");
    assert_eq!(attachment.headers.content_type, "text/csv");
    assert_eq!(attachment.headers.content_transfer_encoding, "base64");

    let stored = server
        .store
        .get_attachment(attachment.id.unwrap())
        .unwrap();
    assert_eq!(stored.contents, "bW9udGgsdG90YWwKamFuLDQy");

    let listed = server.store.get_mails().unwrap();
    assert_eq!(listed[0].attachments[0].contents, "");
}

#[test]
fn test_rset_command() {
    let server = start_test_server();
    let mut client = Client::connect(&server.addr);

    client.read_reply();
    client.send_command("HELO client.local");
    client.send_command("MAIL FROM:<sender@example.com>");
    client.send_command("RCPT TO:<recipient@example.com>");

    assert_eq!(client.send_command("RSET"), "250 Ok");

    client.send_command("MAIL FROM:<newsender@example.com>");
    client.send_command("RCPT TO:<newrecipient@example.com>");
    client.send_command("DATA");
    assert_eq!(
        client.send_data("Subject: After Reset\r\n\r\nThis message came after RSET"),
        "250 Ok"
    );
    client.send_command("QUIT");

    let summary = server
        .subscription
        .recv_timeout(Duration::from_secs(2))
        .unwrap();
    assert_eq!(summary.from_address, "newsender@example.com");
    assert_eq!(summary.to_addresses, vec!["newrecipient@example.com"]);

    assert!(
        server
            .subscription
            .recv_timeout(Duration::from_millis(100))
            .is_err()
    );
}

#[test]
fn test_invalid_data_block_discards_mail() {
    let server = start_test_server();
    let mut client = Client::connect(&server.addr);

    client.read_reply();
    client.send_command("HELO me");
    client.send_command("MAIL FROM:<a@b.com>");
    client.send_command("RCPT TO:<c@d.com>");
    client.send_command("DATA");

    assert!(client.send_data("Subject: no body separator").starts_with("554"));
    assert_eq!(client.read_reply(), "221 Bye");

    assert!(
        server
            .subscription
            .recv_timeout(Duration::from_millis(200))
            .is_err()
    );
    assert_eq!(server.store.mail_count().unwrap(), 0);
}

#[test]
fn test_unknown_commands_are_ignored() {
    let server = start_test_server();
    let mut client = Client::connect(&server.addr);

    client.read_reply();
    client.send_command("HELO me");

    client
        .stream
        .write_all(b"NOOP\r\n")
        .unwrap();
    thread::sleep(Duration::from_millis(50));

    assert_eq!(client.send_command("QUIT"), "221 Bye");
}

#[test]
fn test_worker_pool_rejects_excess_connections() {
    let server = start_server(SessionConfig::default(), Some(1));

    let mut first = Client::connect(&server.addr);
    assert!(first.read_reply().starts_with("220"));

    let mut rejected = Client::connect(&server.addr);
    assert_eq!(rejected.read_reply(), "");

    first.send_command("HELO me");
    first.send_command("MAIL FROM:<a@b.com>");
    first.send_command("RCPT TO:<c@d.com>");
    first.send_command("DATA");
    first.send_data("Subject: pooled\r\n\r\nstill works");
    assert_eq!(first.send_command("QUIT"), "221 Bye");

    let summary = server
        .subscription
        .recv_timeout(Duration::from_secs(2))
        .unwrap();
    assert_eq!(summary.subject, "pooled");

    // The slot is released once the first session ends
    thread::sleep(Duration::from_millis(100));
    let mut next = Client::connect(&server.addr);
    next.send_simple_mail("x@y.com", "z@y.com", "second");
    assert!(
        server
            .subscription
            .recv_timeout(Duration::from_secs(2))
            .is_ok()
    );
}
