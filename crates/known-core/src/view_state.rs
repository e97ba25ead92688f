use serde::Serialize;

use crate::model::Folder;

/// The client-held ordered folder sequence, seeded from the server and
/// extended after successful mutations.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FolderListState {
    folders: Vec<Folder>,
}

impl FolderListState {
    pub fn seeded(folders: Vec<Folder>) -> Self {
        FolderListState { folders }
    }

    pub fn folders(&self) -> &[Folder] {
        &self.folders
    }
}

#[derive(Debug, Clone)]
pub enum Action {
    /// Replace the sequence with the server-provided initial list.
    Seed(Vec<Folder>),
    /// Append the server's canonical record after a successful create.
    Append(Folder),
}

/// Pure reducer for the folder list. Applied synchronously per mutation, so
/// each `Append` sees the sequence produced by the previous action rather
/// than a snapshot captured before a concurrent append completed.
pub fn reduce(state: FolderListState, action: Action) -> FolderListState {
    match action {
        Action::Seed(folders) => FolderListState { folders },
        Action::Append(folder) => {
            let mut folders = state.folders;
            folders.push(folder);
            FolderListState { folders }
        }
    }
}
