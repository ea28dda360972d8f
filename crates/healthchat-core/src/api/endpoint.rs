use reqwest::Method;

/// Cache tags. Queries provide them, mutations invalidate them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tag {
    UserProfile,
    ChatList,
    ChatContent,
}

/// Every remote operation the client knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    SignUp,
    SignIn,
    GetUserProfile,
    UpdateUserProfile,
    Logout,
    CreateChat,
    AddMessageToChat,
    GetUserChatList,
    GetChatContent,
    UpdateChatTitle,
    DeleteChat,
}

/// Static description of one operation.
#[derive(Debug, Clone, Copy)]
pub struct EndpointSpec {
    pub method: MethodKind,
    /// Path relative to the proxy base. `{id}` is replaced by the chat id.
    pub path: &'static str,
    pub provides: &'static [Tag],
    pub invalidates: &'static [Tag],
}

/// `reqwest::Method` is not `const`-constructible, so the table stores this instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodKind {
    Get,
    Post,
    Patch,
    Delete,
}

impl MethodKind {
    pub fn as_method(self) -> Method {
        match self {
            MethodKind::Get => Method::GET,
            MethodKind::Post => Method::POST,
            MethodKind::Patch => Method::PATCH,
            MethodKind::Delete => Method::DELETE,
        }
    }
}

impl Endpoint {
    pub const ALL: [Endpoint; 11] = [
        Endpoint::SignUp,
        Endpoint::SignIn,
        Endpoint::GetUserProfile,
        Endpoint::UpdateUserProfile,
        Endpoint::Logout,
        Endpoint::CreateChat,
        Endpoint::AddMessageToChat,
        Endpoint::GetUserChatList,
        Endpoint::GetChatContent,
        Endpoint::UpdateChatTitle,
        Endpoint::DeleteChat,
    ];

    pub fn spec(self) -> EndpointSpec {
        use MethodKind::*;
        use Tag::*;

        match self {
            Endpoint::SignUp => spec(Post, "authentication_app/signup/", &[], &[]),
            Endpoint::SignIn => spec(Post, "authentication_app/signin/", &[], &[]),
            Endpoint::GetUserProfile => {
                spec(Get, "authentication_app/user_profile/", &[UserProfile], &[])
            }
            Endpoint::UpdateUserProfile => {
                spec(Patch, "authentication_app/user_profile/", &[], &[UserProfile])
            }
            Endpoint::Logout => spec(Post, "authentication_app/logout/", &[], &[]),
            Endpoint::CreateChat => spec(Post, "chat/create_chat/", &[], &[ChatList]),
            Endpoint::AddMessageToChat => spec(
                Post,
                "chat/add_message_to_chat/",
                &[],
                &[ChatContent, ChatList],
            ),
            Endpoint::GetUserChatList => spec(Get, "chat/get_users_chat_list/", &[ChatList], &[]),
            Endpoint::GetChatContent => {
                spec(Get, "chat/get_a_chat_content/{id}/", &[ChatContent], &[])
            }
            Endpoint::UpdateChatTitle => spec(
                Patch,
                "chat/update_chat_title/{id}/",
                &[],
                &[ChatList, ChatContent],
            ),
            Endpoint::DeleteChat => spec(Delete, "chat/delete_chat/{id}/", &[], &[ChatList]),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Endpoint::SignUp => "sign_up",
            Endpoint::SignIn => "sign_in",
            Endpoint::GetUserProfile => "get_user_profile",
            Endpoint::UpdateUserProfile => "update_user_profile",
            Endpoint::Logout => "logout",
            Endpoint::CreateChat => "create_chat",
            Endpoint::AddMessageToChat => "add_message_to_chat",
            Endpoint::GetUserChatList => "get_user_chat_list",
            Endpoint::GetChatContent => "get_chat_content",
            Endpoint::UpdateChatTitle => "update_chat_title",
            Endpoint::DeleteChat => "delete_chat",
        }
    }

    /// Concrete relative path, with `{id}` filled in when the template has one.
    pub fn path(self, id: Option<i64>) -> String {
        let template = self.spec().path;
        match id {
            Some(id) => template.replace("{id}", &id.to_string()),
            None => template.to_string(),
        }
    }

    pub fn is_query(self) -> bool {
        self.spec().method == MethodKind::Get
    }
}

const fn spec(
    method: MethodKind,
    path: &'static str,
    provides: &'static [Tag],
    invalidates: &'static [Tag],
) -> EndpointSpec {
    EndpointSpec {
        method,
        path,
        provides,
        invalidates,
    }
}
