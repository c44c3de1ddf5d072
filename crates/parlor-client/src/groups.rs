//! Navigation state of the groups screen.
//!
//! The screen is either the group list or one group's detail view. Whether
//! the creation form is open is a separate flag, not a third view.

use parlor_shared::ChatId;

/// Which part of the groups screen is showing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum GroupView {
    #[default]
    List,
    Detail(ChatId),
}

/// Per-session navigation state of the groups screen.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupNavigator {
    view: GroupView,
    create_form_open: bool,
}

impl GroupNavigator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn view(&self) -> &GroupView {
        &self.view
    }

    pub fn selected(&self) -> Option<&ChatId> {
        match &self.view {
            GroupView::Detail(id) => Some(id),
            GroupView::List => None,
        }
    }

    pub fn select(&mut self, chat_id: ChatId) {
        self.view = GroupView::Detail(chat_id);
    }

    pub fn back(&mut self) {
        self.view = GroupView::List;
    }

    pub fn is_create_form_open(&self) -> bool {
        self.create_form_open
    }

    pub fn toggle_create_form(&mut self) -> bool {
        self.create_form_open = !self.create_form_open;
        self.create_form_open
    }

    pub fn close_create_form(&mut self) {
        self.create_form_open = false;
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_detail_list() {
        let mut nav = GroupNavigator::new();
        assert_eq!(nav.view(), &GroupView::List);

        nav.select(ChatId::from("g1"));
        assert_eq!(nav.selected(), Some(&ChatId::from("g1")));

        nav.select(ChatId::from("g2"));
        assert_eq!(nav.view(), &GroupView::Detail(ChatId::from("g2")));

        nav.back();
        assert_eq!(nav.view(), &GroupView::List);
        assert!(nav.selected().is_none());
    }

    #[test]
    fn create_form_is_independent_of_view() {
        let mut nav = GroupNavigator::new();
        assert!(nav.toggle_create_form());
        nav.select(ChatId::from("g1"));
        assert!(nav.is_create_form_open());
        assert!(!nav.toggle_create_form());

        nav.toggle_create_form();
        nav.reset();
        assert_eq!(nav, GroupNavigator::default());
    }
}
