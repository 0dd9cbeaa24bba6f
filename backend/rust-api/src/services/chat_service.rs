use chrono::Utc;
use futures::TryStreamExt;
use mongodb::bson::{doc, oid::ObjectId};
use mongodb::Database;

use crate::error::ApiError;
use crate::models::chat::{Chat, Message, MessageOut};
use crate::models::student::StudentProfile;
use crate::models::teacher::TeacherProfile;
use crate::models::user::Account;
use crate::policy::Principal;

/// Outcome of a chat-open request: the pair's chat, flagged by whether this
/// call inserted it. Lets the handler answer 201 only for a fresh chat.
pub enum ChatLookup {
    Created(Chat),
    Existing(Chat),
}

impl ChatLookup {
    pub fn into_chat(self) -> Chat {
        match self {
            ChatLookup::Created(chat) | ChatLookup::Existing(chat) => chat,
        }
    }
}

pub struct ChatService {
    mongo: Database,
}

impl ChatService {
    pub fn new(mongo: Database) -> Self {
        Self { mongo }
    }

    /// The single authorization-sensitive write in the chat subsystem.
    /// Idempotent: an existing chat for the pair is returned untouched.
    /// Pairing rule: a student may only open a chat with their assigned
    /// teacher's account, a teacher only with accounts of students assigned
    /// to them; every other combination is denied.
    pub async fn create_or_get_chat(
        &self,
        principal: &Principal,
        other_user_id: &str,
    ) -> Result<ChatLookup, ApiError> {
        let other_oid = ObjectId::parse_str(other_user_id)
            .map_err(|_| ApiError::validation("Invalid participant id"))?;
        let own_id = principal.account_id();

        if other_oid == own_id {
            return Err(ApiError::validation("Cannot open a chat with yourself"));
        }

        let chats = self.mongo.collection::<Chat>("chats");

        // Dedup first: the pair check is on the unordered participant set.
        if let Some(existing) = chats
            .find_one(doc! { "participants": { "$all": [own_id, other_oid], "$size": 2 } })
            .await?
        {
            return Ok(ChatLookup::Existing(existing));
        }

        self.check_pairing(principal, other_oid).await?;

        let chat = Chat {
            id: None,
            participants: vec![own_id, other_oid],
            created_by: own_id,
            created_at: Utc::now(),
        };

        let insert = chats.insert_one(&chat).await?;
        let chat_id = insert
            .inserted_id
            .as_object_id()
            .ok_or_else(|| ApiError::internal(anyhow::anyhow!("Missing inserted chat id")))?;

        tracing::info!(chat_id = %chat_id.to_hex(), "Chat created");

        let mut created = chat;
        created.id = Some(chat_id);
        Ok(ChatLookup::Created(created))
    }

    /// All chats the principal participates in (snapshot source for the
    /// teacher "all" socket mode).
    pub async fn list_chats(&self, principal: &Principal) -> Result<Vec<Chat>, ApiError> {
        let own_id = principal.account_id();
        let chats: Vec<Chat> = self
            .mongo
            .collection::<Chat>("chats")
            .find(doc! { "participants": own_id })
            .await?
            .try_collect()
            .await?;
        Ok(chats)
    }

    /// Participant-scoped chat load; non-members see NotFound, the same as a
    /// chat that does not exist.
    pub async fn load_member_chat(
        &self,
        principal: &Principal,
        chat_id: &str,
    ) -> Result<Chat, ApiError> {
        let chat_oid = ObjectId::parse_str(chat_id)
            .map_err(|_| ApiError::not_found("Chat not found"))?;
        let own_id = principal.account_id();

        self.mongo
            .collection::<Chat>("chats")
            .find_one(doc! { "_id": chat_oid })
            .await?
            .filter(|chat| chat.has_participant(&own_id))
            .ok_or_else(|| ApiError::not_found("Chat not found"))
    }

    /// Ordered message history for a chat the principal belongs to.
    pub async fn list_messages(
        &self,
        principal: &Principal,
        chat_id: &str,
    ) -> Result<Vec<MessageOut>, ApiError> {
        let chat = self.load_member_chat(principal, chat_id).await?;
        let chat_oid = chat.id.unwrap_or_default();

        let messages: Vec<Message> = self
            .mongo
            .collection::<Message>("messages")
            .find(doc! { "chat_id": chat_oid })
            .sort(doc! { "timestamp": 1 })
            .await?
            .try_collect()
            .await?;

        let mut out = Vec::with_capacity(messages.len());
        for message in messages {
            let username = self.username_of(&message.sender_id).await?;
            out.push(MessageOut::from_message(message, username));
        }
        Ok(out)
    }

    /// Persist one message; the sender must be a current participant.
    /// Broadcast happens only after this returns Ok.
    pub async fn save_message(
        &self,
        sender: &Account,
        chat_id: &ObjectId,
        content: &str,
    ) -> Result<MessageOut, ApiError> {
        let sender_id = sender
            .id
            .ok_or_else(|| ApiError::internal(anyhow::anyhow!("Sender account has no id")))?;

        let chat = self
            .mongo
            .collection::<Chat>("chats")
            .find_one(doc! { "_id": chat_id })
            .await?
            .ok_or_else(|| ApiError::not_found("Chat not found"))?;

        if !chat.has_participant(&sender_id) {
            return Err(ApiError::permission("Sender is not a chat participant"));
        }

        let message = Message {
            id: None,
            chat_id: *chat_id,
            sender_id,
            content: content.to_string(),
            timestamp: Utc::now(),
            read: false,
        };

        let insert = self
            .mongo
            .collection::<Message>("messages")
            .insert_one(&message)
            .await?;

        let mut persisted = message;
        persisted.id = insert.inserted_id.as_object_id();

        Ok(MessageOut::from_message(persisted, sender.username.clone()))
    }

    /// Resolve the storage-backed facts the pairing rule needs, then apply
    /// the pure rule. Only the lookups live here.
    async fn check_pairing(
        &self,
        principal: &Principal,
        other_account_id: ObjectId,
    ) -> Result<(), ApiError> {
        let facts = match principal {
            Principal::Student(_, profile) => {
                let assigned_teacher_account = match profile.assigned_teacher {
                    Some(teacher_id) => self
                        .mongo
                        .collection::<TeacherProfile>("teachers")
                        .find_one(doc! { "_id": teacher_id })
                        .await?
                        .map(|teacher| teacher.user_id),
                    None => None,
                };
                PairingFacts {
                    assigned_teacher_account,
                    other_student_assignment: None,
                }
            }
            Principal::Teacher(..) => {
                let other_student_assignment = self
                    .mongo
                    .collection::<StudentProfile>("students")
                    .find_one(doc! { "user_id": other_account_id })
                    .await?
                    .and_then(|student| student.assigned_teacher);
                PairingFacts {
                    assigned_teacher_account: None,
                    other_student_assignment,
                }
            }
            Principal::Admin(_) => PairingFacts {
                assigned_teacher_account: None,
                other_student_assignment: None,
            },
        };
        pairing_allowed(principal, other_account_id, &facts)
    }

    async fn username_of(&self, account_id: &ObjectId) -> Result<String, ApiError> {
        let account = self
            .mongo
            .collection::<Account>("users")
            .find_one(doc! { "_id": account_id })
            .await?;
        Ok(account
            .map(|a| a.username)
            .unwrap_or_else(|| "unknown".to_string()))
    }
}

/// Storage-resolved inputs to the pairing rule.
struct PairingFacts {
    /// Account behind the caller's assigned teacher, when the caller is a
    /// student with a live assignment.
    assigned_teacher_account: Option<ObjectId>,
    /// Teacher profile the other account's student record is assigned to,
    /// when the other account belongs to an assigned student.
    other_student_assignment: Option<ObjectId>,
}

/// Pairing rule: a chat may exist only between a student and the teacher
/// they are assigned to. Role plus ids in, allow or deny out.
fn pairing_allowed(
    principal: &Principal,
    other_account_id: ObjectId,
    facts: &PairingFacts,
) -> Result<(), ApiError> {
    match principal {
        Principal::Student(..) => match facts.assigned_teacher_account {
            Some(teacher_account) if teacher_account == other_account_id => Ok(()),
            Some(_) => Err(ApiError::permission(
                "Students may only chat with their assigned teacher",
            )),
            None => Err(ApiError::permission("You have no assigned teacher")),
        },
        Principal::Teacher(_, profile) => match facts.other_student_assignment {
            Some(assignment) if profile.id == Some(assignment) => Ok(()),
            _ => Err(ApiError::permission(
                "Teachers may only chat with their assigned students",
            )),
        },
        Principal::Admin(_) => Err(ApiError::permission(
            "Chats exist only between students and their assigned teacher",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::teacher::ProfileStatus;
    use crate::models::user::Role;
    use chrono::NaiveDate;

    fn account(role: Role) -> Account {
        Account {
            id: Some(ObjectId::new()),
            username: "u".to_string(),
            email: "u@example.com".to_string(),
            first_name: String::new(),
            last_name: String::new(),
            phone: String::new(),
            password_hash: String::new(),
            role,
            is_active: true,
            created_at: Utc::now(),
        }
    }

    fn student_principal(assigned_teacher: Option<ObjectId>) -> Principal {
        let profile = StudentProfile {
            id: Some(ObjectId::new()),
            user_id: ObjectId::new(),
            phone: String::new(),
            roll_number: "R1".to_string(),
            student_class: "10-A".to_string(),
            date_of_birth: NaiveDate::from_ymd_opt(2010, 5, 1).unwrap(),
            admission_date: NaiveDate::from_ymd_opt(2024, 4, 1).unwrap(),
            status: ProfileStatus::Active,
            assigned_teacher,
        };
        Principal::Student(account(Role::Student), profile)
    }

    fn teacher_principal(profile_id: ObjectId) -> Principal {
        let profile = TeacherProfile {
            id: Some(profile_id),
            user_id: ObjectId::new(),
            phone: String::new(),
            subject_specialization: "Math".to_string(),
            employee_id: "T001".to_string(),
            date_of_joining: NaiveDate::from_ymd_opt(2020, 9, 1).unwrap(),
            status: ProfileStatus::Active,
        };
        Principal::Teacher(account(Role::Teacher), profile)
    }

    fn facts(
        assigned_teacher_account: Option<ObjectId>,
        other_student_assignment: Option<ObjectId>,
    ) -> PairingFacts {
        PairingFacts {
            assigned_teacher_account,
            other_student_assignment,
        }
    }

    #[test]
    fn student_may_chat_with_assigned_teacher_only() {
        let teacher_account = ObjectId::new();
        let stranger_account = ObjectId::new();
        let student = student_principal(Some(ObjectId::new()));

        let own = facts(Some(teacher_account), None);
        assert!(pairing_allowed(&student, teacher_account, &own).is_ok());
        assert!(pairing_allowed(&student, stranger_account, &own).is_err());
    }

    #[test]
    fn unassigned_student_may_chat_with_nobody() {
        let student = student_principal(None);
        let err = pairing_allowed(&student, ObjectId::new(), &facts(None, None)).unwrap_err();
        assert!(matches!(err, ApiError::Permission(_)));
    }

    #[test]
    fn teacher_may_chat_with_assigned_students_only() {
        let profile_id = ObjectId::new();
        let teacher = teacher_principal(profile_id);
        let student_account = ObjectId::new();

        let assigned = facts(None, Some(profile_id));
        assert!(pairing_allowed(&teacher, student_account, &assigned).is_ok());

        let foreign = facts(None, Some(ObjectId::new()));
        assert!(pairing_allowed(&teacher, student_account, &foreign).is_err());

        // No student record behind the other account at all.
        assert!(pairing_allowed(&teacher, student_account, &facts(None, None)).is_err());
    }

    #[test]
    fn admin_is_never_a_chat_party() {
        let admin = Principal::Admin(account(Role::Admin));
        let err = pairing_allowed(&admin, ObjectId::new(), &facts(None, None)).unwrap_err();
        assert!(matches!(err, ApiError::Permission(_)));
    }
}
