//! Gearman worker client
//!
//! Implements the worker side of the protocol only: identify, advertise
//! functions, grab jobs (sleeping on `NO_JOB` until the server sends `NOOP`)
//! and report `WORK_COMPLETE` / `WORK_EXCEPTION`. A lost connection is
//! dropped and re-established on the next [`JobQueue::next_job`] call.

use async_trait::async_trait;
use bytes::Bytes;
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

use super::packet::{Magic, Packet, PacketType, read_packet, write_packet};
use super::{Job, JobHandle, JobQueue, Outcome, QueueError, Result};

pub struct GearmanWorker {
    host: String,
    port: u16,
    worker_id: String,
    functions: Vec<String>,
    connection: Option<TcpStream>,
}

impl GearmanWorker {
    pub fn new(host: impl Into<String>, port: u16, worker_id: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            worker_id: worker_id.into(),
            functions: Vec::new(),
            connection: None,
        }
    }

    /// Advertise a function; takes effect on the next (re)connect
    pub fn register_function(&mut self, name: impl Into<String>) {
        let name = name.into();
        if !self.functions.contains(&name) {
            self.functions.push(name);
        }
        self.connection = None;
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    async fn connect(&self) -> Result<TcpStream> {
        let mut stream = TcpStream::connect((self.host.as_str(), self.port)).await?;
        stream.set_nodelay(true)?;

        write_packet(
            &mut stream,
            &Packet::request(PacketType::SetClientId, self.worker_id.clone()),
        )
        .await?;

        for function in &self.functions {
            write_packet(
                &mut stream,
                &Packet::request(PacketType::CanDo, function.clone()),
            )
            .await?;
        }

        info!(
            host = %self.host,
            port = self.port,
            worker_id = %self.worker_id,
            functions = ?self.functions,
            "Connected to Gearman server"
        );

        Ok(stream)
    }

    async fn grab(stream: &mut TcpStream) -> Result<Job> {
        loop {
            write_packet(stream, &Packet::request(PacketType::GrabJob, Bytes::new())).await?;

            loop {
                let packet = read_packet(stream).await?;
                expect_response(&packet)?;

                match packet.kind {
                    PacketType::JobAssign => return parse_assignment(&packet),
                    PacketType::NoJob => {
                        debug!("No job available, sleeping");
                        write_packet(stream, &Packet::request(PacketType::PreSleep, Bytes::new()))
                            .await?;
                        wait_for_wakeup(stream).await?;
                        break;
                    }
                    // Wake-ups can race with a pending GRAB_JOB
                    PacketType::Noop => continue,
                    PacketType::Error => return Err(server_error(&packet)),
                    other => {
                        return Err(QueueError::Protocol(format!(
                            "unexpected {:?} while grabbing a job",
                            other
                        )));
                    }
                }
            }
        }
    }
}

#[async_trait]
impl JobQueue for GearmanWorker {
    async fn next_job(&mut self) -> Result<Job> {
        let mut stream = match self.connection.take() {
            Some(stream) => stream,
            None => self.connect().await?,
        };

        // On error the stream is dropped, forcing a reconnect next time
        let job = Self::grab(&mut stream).await?;
        self.connection = Some(stream);

        debug!(handle = %job.handle, function = %job.function, "Job assigned");
        Ok(job)
    }

    async fn report(&mut self, handle: JobHandle, outcome: &Outcome) -> Result<()> {
        let Some(stream) = self.connection.as_mut() else {
            warn!(%handle, "Cannot report outcome, connection lost");
            return Err(QueueError::Disconnected);
        };

        let packet = match outcome {
            Outcome::Complete => Packet::with_args(
                Magic::Request,
                PacketType::WorkComplete,
                &[handle.as_str().as_bytes(), b"".as_slice()],
            ),
            Outcome::Exception(message) => Packet::with_args(
                Magic::Request,
                PacketType::WorkException,
                &[handle.as_str().as_bytes(), message.as_bytes()],
            ),
        };

        if let Err(e) = write_packet(stream, &packet).await {
            self.connection = None;
            return Err(e);
        }

        Ok(())
    }
}

fn expect_response(packet: &Packet) -> Result<()> {
    if packet.magic != Magic::Response {
        return Err(QueueError::Protocol(format!(
            "expected a response packet, got request {:?}",
            packet.kind
        )));
    }
    Ok(())
}

async fn wait_for_wakeup(stream: &mut TcpStream) -> Result<()> {
    loop {
        let packet = read_packet(stream).await?;
        expect_response(&packet)?;

        match packet.kind {
            PacketType::Noop => return Ok(()),
            PacketType::Error => return Err(server_error(&packet)),
            other => debug!(kind = ?other, "Ignoring packet while asleep"),
        }
    }
}

fn parse_assignment(packet: &Packet) -> Result<Job> {
    let mut args = packet.args(3).into_iter();
    let (Some(handle), Some(function), Some(arguments)) = (args.next(), args.next(), args.next())
    else {
        return Err(QueueError::Protocol(
            "JOB_ASSIGN needs handle, function and arguments".to_string(),
        ));
    };

    Ok(Job {
        handle: JobHandle::new(String::from_utf8_lossy(&handle).into_owned()),
        function: String::from_utf8_lossy(&function).into_owned(),
        arguments,
    })
}

fn server_error(packet: &Packet) -> QueueError {
    let args = packet.args(2);
    let text = |idx: usize| {
        args.get(idx)
            .map(|arg| String::from_utf8_lossy(arg).into_owned())
            .unwrap_or_default()
    };

    QueueError::Server {
        code: text(0),
        message: text(1),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    async fn expect_request(stream: &mut TcpStream, kind: PacketType) -> Packet {
        let packet = read_packet(stream).await.unwrap();
        assert_eq!(packet.magic, Magic::Request);
        assert_eq!(packet.kind, kind);
        packet
    }

    async fn send(stream: &mut TcpStream, kind: PacketType, args: &[&[u8]]) {
        write_packet(stream, &Packet::with_args(Magic::Response, kind, args))
            .await
            .unwrap();
    }

    async fn start_server<F, Fut>(script: F) -> (u16, JoinHandle<Vec<Packet>>)
    where
        F: FnOnce(TcpListener) -> Fut + Send + 'static,
        Fut: std::future::Future<Output = Vec<Packet>> + Send + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        (port, tokio::spawn(script(listener)))
    }

    async fn handshake(stream: &mut TcpStream) -> Vec<Packet> {
        vec![
            expect_request(stream, PacketType::SetClientId).await,
            expect_request(stream, PacketType::CanDo).await,
        ]
    }

    #[tokio::test]
    async fn test_sleep_wake_assign_complete() {
        let (port, server) = start_server(|listener| async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut seen = handshake(&mut stream).await;

            expect_request(&mut stream, PacketType::GrabJob).await;
            send(&mut stream, PacketType::NoJob, &[]).await;
            expect_request(&mut stream, PacketType::PreSleep).await;
            send(&mut stream, PacketType::Noop, &[]).await;

            expect_request(&mut stream, PacketType::GrabJob).await;
            send(
                &mut stream,
                PacketType::JobAssign,
                &[
                    b"H:gear:1".as_slice(),
                    b"push-subunit".as_slice(),
                    br#"{"retry": false}"#.as_slice(),
                ],
            )
            .await;

            seen.push(expect_request(&mut stream, PacketType::WorkComplete).await);
            seen
        })
        .await;

        let mut worker = GearmanWorker::new("127.0.0.1", port, "ci-host-pusher");
        worker.register_function("push-subunit");

        let job = worker.next_job().await.unwrap();
        assert_eq!(job.handle.as_str(), "H:gear:1");
        assert_eq!(job.function, "push-subunit");
        assert_eq!(&job.arguments[..], br#"{"retry": false}"#);

        worker.report(job.handle, &Outcome::Complete).await.unwrap();

        let seen = server.await.unwrap();
        assert_eq!(&seen[0].data[..], b"ci-host-pusher");
        assert_eq!(&seen[1].data[..], b"push-subunit");
        assert_eq!(&seen[2].data[..], b"H:gear:1\0");
    }

    #[tokio::test]
    async fn test_exception_report() {
        let (port, server) = start_server(|listener| async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            handshake(&mut stream).await;

            expect_request(&mut stream, PacketType::GrabJob).await;
            send(
                &mut stream,
                PacketType::JobAssign,
                &[b"H:gear:2".as_slice(), b"push-subunit".as_slice(), b"{}".as_slice()],
            )
            .await;

            vec![expect_request(&mut stream, PacketType::WorkException).await]
        })
        .await;

        let mut worker = GearmanWorker::new("127.0.0.1", port, "ci-host-pusher");
        worker.register_function("push-subunit");

        let job = worker.next_job().await.unwrap();
        worker
            .report(
                job.handle,
                &Outcome::Exception("source artifact unavailable".to_string()),
            )
            .await
            .unwrap();

        let seen = server.await.unwrap();
        assert_eq!(&seen[0].data[..], b"H:gear:2\0source artifact unavailable");
    }

    #[tokio::test]
    async fn test_server_error_surfaces() {
        let (port, server) = start_server(|listener| async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            handshake(&mut stream).await;

            expect_request(&mut stream, PacketType::GrabJob).await;
            send(
                &mut stream,
                PacketType::Error,
                &[b"ERR_UNKNOWN".as_slice(), b"no such function".as_slice()],
            )
            .await;
            Vec::new()
        })
        .await;

        let mut worker = GearmanWorker::new("127.0.0.1", port, "ci-host-pusher");
        worker.register_function("push-subunit");

        match worker.next_job().await.unwrap_err() {
            QueueError::Server { code, message } => {
                assert_eq!(code, "ERR_UNKNOWN");
                assert_eq!(message, "no such function");
            }
            other => panic!("unexpected error: {other}"),
        }
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_reconnects_after_connection_loss() {
        let (port, server) = start_server(|listener| async move {
            // First connection dies right after the handshake
            let (mut stream, _) = listener.accept().await.unwrap();
            handshake(&mut stream).await;
            expect_request(&mut stream, PacketType::GrabJob).await;
            drop(stream);

            let (mut stream, _) = listener.accept().await.unwrap();
            let seen = handshake(&mut stream).await;
            expect_request(&mut stream, PacketType::GrabJob).await;
            send(
                &mut stream,
                PacketType::JobAssign,
                &[b"H:gear:3".as_slice(), b"push-subunit".as_slice(), b"{}".as_slice()],
            )
            .await;
            seen
        })
        .await;

        let mut worker = GearmanWorker::new("127.0.0.1", port, "ci-host-pusher");
        worker.register_function("push-subunit");

        assert!(matches!(worker.next_job().await, Err(QueueError::Io(_))));

        let job = worker.next_job().await.unwrap();
        assert_eq!(job.handle.as_str(), "H:gear:3");

        let seen = server.await.unwrap();
        assert_eq!(&seen[1].data[..], b"push-subunit");
    }

    #[tokio::test]
    async fn test_report_without_connection() {
        let mut worker = GearmanWorker::new("127.0.0.1", 1, "ci-host-pusher");
        let err = worker
            .report(JobHandle::new("H:gear:9"), &Outcome::Complete)
            .await
            .unwrap_err();
        assert!(matches!(err, QueueError::Disconnected));
    }
}
