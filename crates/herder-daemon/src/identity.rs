//! User and group resolution for `uid=` / `gid=` process options

use herder_core::prelude::*;

/// Numeric identity a child process should run as
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Identity {
    pub uid: Option<u32>,
    pub gid: Option<u32>,
    /// Login name of `uid`, used to load supplementary groups
    pub username: Option<String>,
}

impl Identity {
    pub fn is_default(&self) -> bool {
        self.uid.is_none() && self.gid.is_none()
    }
}

/// Resolve user and group selectors, each either numeric or a name.
///
/// When only a user is given, the user's primary group is used.
#[cfg(unix)]
pub fn resolve(user: Option<&str>, group: Option<&str>) -> Result<Identity> {
    use nix::unistd::{Gid, Group, Uid, User};

    let user = match user {
        Some(selector) => {
            let found = match selector.parse::<u32>() {
                Ok(id) => User::from_uid(Uid::from_raw(id)).ok().flatten().ok_or_else(|| {
                    Error::invalid_identity(format!("{selector:?} is not a valid user id"))
                })?,
                Err(_) => User::from_name(selector).ok().flatten().ok_or_else(|| {
                    Error::invalid_identity(format!("{selector:?} is not a valid user name"))
                })?,
            };
            Some(found)
        }
        None => None,
    };

    let gid = match group {
        Some(selector) => {
            let found = match selector.parse::<u32>() {
                Ok(id) => Group::from_gid(Gid::from_raw(id)).ok().flatten(),
                Err(_) => Group::from_name(selector).ok().flatten(),
            };
            let group = found
                .ok_or_else(|| Error::invalid_identity(format!("No such group: {selector:?}")))?;
            Some(group.gid.as_raw())
        }
        None => user.as_ref().map(|u| u.gid.as_raw()),
    };

    let identity = Identity {
        uid: user.as_ref().map(|u| u.uid.as_raw()),
        gid,
        username: user.map(|u| u.name),
    };
    debug!("Resolved identity {:?}", identity);
    Ok(identity)
}

#[cfg(not(unix))]
pub fn resolve(user: Option<&str>, group: Option<&str>) -> Result<Identity> {
    if user.is_some() {
        return Err(Error::unsupported("uid"));
    }
    if group.is_some() {
        return Err(Error::unsupported("gid"));
    }
    Ok(Identity::default())
}
