use crate::request::RequestContext;
use crate::response::ResponseSink;
use crate::session::Session;

/// 一次请求的全部可变状态
///
/// 每个请求新建一次，按 `&mut` 传给管道的每一步，不跨请求复用。
#[derive(Debug)]
pub struct Exchange {
    pub request: RequestContext,
    pub session: Session,
    pub response: ResponseSink,
}

impl Exchange {
    pub fn new(request: RequestContext, session: Session) -> Self {
        Self {
            request,
            session,
            response: ResponseSink::new(),
        }
    }
}
