use crate::modules::error::MailroomResult;

pub trait Initialize {
    async fn initialize() -> MailroomResult<()>;
}

pub trait MailroomTask {
    fn start();
}
