/**
 * @file events.rs
 * @brief Session lifecycle event bus
 *
 * @author KleaSCM
 * @email KleaSCM@gmail.com
 */

use tokio::sync::broadcast;

use crate::ids::{ProcessId, SessionId};

use super::SessionStatus;

#[derive(Debug, Clone)]
pub enum SessionEvent {
	Created(SessionId),
	StatusChanged(SessionId, SessionStatus),
	PtyBound(SessionId, ProcessId),
	PtyUnbound(SessionId, ProcessId),
	Terminated(SessionId),
}

const EVENT_CAPACITY: usize = 256;

pub fn channel() -> (broadcast::Sender<SessionEvent>, broadcast::Receiver<SessionEvent>) {
	broadcast::channel(EVENT_CAPACITY)
}
