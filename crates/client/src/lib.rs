use async_trait::async_trait;

use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

/// Something that accepts a request and eventually answers it.
#[async_trait]
pub trait CommandSink {
    type Request;
    type Response;

    async fn command(&self, request: Self::Request) -> Self::Response;
}

/// A long-running unit of the supervisor. Every task runs until it is
/// cancelled or fails.
#[async_trait]
pub trait Task {
    fn name(&self) -> &'static str;

    async fn run(self: Box<Self>, cancel: CancellationToken) -> anyhow::Result<()>;
}

/// A request paired with the channel its answer goes back on.
pub type Command<Req, Res> = (Req, oneshot::Sender<anyhow::Result<Res>>);
pub type ChannelCommandSink<Req, Res> = flume::Sender<Command<Req, Res>>;
pub type ChannelCommandSource<Req, Res> = flume::Receiver<Command<Req, Res>>;

pub fn command_channel<Req, Res>(
    capacity: usize,
) -> (ChannelCommandSink<Req, Res>, ChannelCommandSource<Req, Res>) {
    flume::bounded(capacity)
}

#[async_trait]
impl<Req: Send, Res: Send> CommandSink for ChannelCommandSink<Req, Res> {
    type Request = Req;
    type Response = anyhow::Result<Res>;

    async fn command(&self, request: Self::Request) -> Self::Response {
        let (tx, rx) = oneshot::channel();
        if self.send_async((request, tx)).await.is_err() {
            anyhow::bail!("could not send command, receiving task is gone");
        }
        match rx.await {
            Ok(res) => res,
            Err(_) => anyhow::bail!("receiving task dropped the command without answering"),
        }
    }
}
