use crate::auth::repo_types::User;
use crate::store::Document;

impl Document {
    pub fn find_by_username(&self, username: &str) -> Option<&User> {
        self.users.iter().find(|u| u.username == username)
    }

    pub fn find_by_email(&self, email: &str) -> Option<&User> {
        self.users.iter().find(|u| u.email == email)
    }

    pub fn find_by_email_mut(&mut self, email: &str) -> Option<&mut User> {
        self.users.iter_mut().find(|u| u.email == email)
    }

    pub fn find_by_username_mut(&mut self, username: &str) -> Option<&mut User> {
        self.users.iter_mut().find(|u| u.username == username)
    }

    /// Username match wins over email match.
    pub fn find_by_identifier(&self, identifier: &str) -> Option<&User> {
        self.find_by_username(identifier)
            .or_else(|| self.find_by_email(identifier))
    }

    /// Adds a user with empty task and trash collections. Uniqueness is checked by the caller.
    pub fn insert_user(&mut self, user: User) {
        self.tasks_by_user.entry(user.username.clone()).or_default();
        self.trash_by_user.entry(user.username.clone()).or_default();
        self.users.push(user);
    }
}
