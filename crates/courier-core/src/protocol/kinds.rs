//! Integer-coded event kinds.
//!
//! Both directions carry their kind as a bare integer in the `type` field.
//! Values the server does not know are preserved as `Unknown(n)` so that a
//! newer client never fails decoding just because it speaks a newer kind.

use serde::{Deserialize, Serialize};

macro_rules! wire_kind {
    (
        $(#[$meta:meta])*
        $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident = $value:literal => $label:literal, )+
        }
    ) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(from = "i16", into = "i16")]
        pub enum $name {
            $( $(#[$vmeta])* $variant, )+
            /// A value this server does not recognise.
            Unknown(i16),
        }

        impl $name {
            /// Short label used in log lines.
            pub fn label(self) -> &'static str {
                match self {
                    $( Self::$variant => $label, )+
                    Self::Unknown(_) => "unknown",
                }
            }
        }

        impl From<i16> for $name {
            fn from(value: i16) -> Self {
                match value {
                    $( $value => Self::$variant, )+
                    other => Self::Unknown(other),
                }
            }
        }

        impl From<$name> for i16 {
            fn from(kind: $name) -> Self {
                match kind {
                    $( $name::$variant => $value, )+
                    $name::Unknown(other) => other,
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.label())
            }
        }
    };
}

wire_kind! {
    /// Kind of a server-originated push.
    PushKind {
        /// A group was created.
        AddGroup = 0 => "addGroup",
        /// A thread was created.
        AddThread = 1 => "addThread",
        /// A message was posted.
        AddMessage = 2 => "addMessage",
        /// A sent/delivered/read receipt.
        MessageReceipt = 3 => "receipt",
        /// A group was renamed.
        ChangeGroupName = 4 => "changeGroupName",
        /// A member joined a group.
        AddGroupMember = 5 => "addGroupMember",
        /// A member left a group.
        RemoveGroupMember = 6 => "removeGroupMember",
        /// A system notice.
        SystemMessage = 7 => "systemMessage",
        /// A reply correlated with a client sequence number.
        ClientReply = 8 => "reply",
        /// A chat id was assigned.
        AddChatId = 9 => "addChatId",
        /// A contact joined the service.
        AppContact = 10 => "addAppContact",
        /// A thread title changed.
        UpdateThreadTitle = 11 => "updateThreadTitle",
        /// A task log entry.
        AddTaskLogItem = 12 => "taskLogItem",
        /// A task was created.
        AddTask = 13 => "task",
        /// A task status changed.
        AddTaskStatus = 14 => "taskStatus",
        /// A message on a task.
        AddTaskMessage = 15 => "taskMessage",
        /// A chat was created.
        AddChat = 16 => "chat",
        /// A chat message.
        AddChatMessage = 17 => "chat message",
        /// A task reminder.
        AddTaskReminder = 18 => "task reminder",
        /// A task was marked done.
        AddTaskDone = 19 => "task done",
        /// A task was marked not done.
        AddTaskNotDone = 20 => "task not done",
        /// A waiting request was raised.
        AddWaitingRequest = 21 => "waiting request",
        /// A waiting request was accepted.
        AcceptWaitingRequest = 22 => "accept waiting request",
        /// A waiting request was denied.
        DenyWaitingRequest = 23 => "deny waiting request",
        /// A chat group was created.
        AddChatGroup = 24 => "chat group",
        /// A chat group member was added.
        AddChatGroupMember = 25 => "chat group member",
        /// A presence change.
        AddPresence = 26 => "presence",
        /// A reaction to finished work.
        AddGoodJobMessage = 27 => "good job",
    }
}

impl PushKind {
    /// Whether acknowledging a push of this kind notifies its author with a
    /// delivered receipt.
    pub fn sends_delivery_receipt(self) -> bool {
        matches!(
            self,
            Self::AddChatMessage
                | Self::AddTaskStatus
                | Self::AddTaskMessage
                | Self::AddTaskReminder
                | Self::AddTaskDone
                | Self::AddTaskNotDone
                | Self::AddWaitingRequest
                | Self::AcceptWaitingRequest
                | Self::DenyWaitingRequest
        )
    }
}

wire_kind! {
    /// Kind of a client-originated event.
    ClientKind {
        /// Create a group.
        AddGroup = 1 => "addGroup",
        /// Create a thread.
        AddThread = 2 => "addThread",
        /// Post a message.
        AddMessage = 3 => "addMessage",
        /// Acknowledge a server push by id.
        Ack = 4 => "ack",
        /// Liveness ping expecting a reply.
        Ping = 5 => "ping",
        /// Batch of read receipts.
        ReadReceipt = 6 => "readReceipt",
        /// Add a task log entry.
        AddTaskLogItem = 7 => "taskLogItem",
        /// Create a task.
        AddTask = 8 => "task",
        /// Change a task status.
        AddTaskStatus = 9 => "taskStatus",
        /// Post a message on a task.
        AddTaskMessage = 10 => "taskMessage",
        /// Create a chat.
        AddChat = 11 => "chat",
        /// Post a chat message.
        AddChatMessage = 12 => "chat message",
        /// Set a task reminder.
        AddTaskReminder = 13 => "task reminder",
        /// Mark a task done.
        AddTaskDone = 14 => "task done",
        /// Mark a task not done.
        AddTaskNotDone = 15 => "task not done",
        /// Raise a waiting request.
        AddWaitingRequest = 16 => "waiting request",
        /// Accept a waiting request.
        AcceptWaitingRequest = 17 => "accept waiting request",
        /// Deny a waiting request.
        DenyWaitingRequest = 18 => "deny waiting request",
        /// Create a chat group.
        AddChatGroup = 19 => "chat group",
        /// Add a chat group member.
        AddChatGroupMember = 20 => "chat group member",
        /// Presence or typing update.
        AddPresence = 21 => "presence",
        /// React to finished work.
        AddGoodJobMessage = 22 => "good job",
    }
}
