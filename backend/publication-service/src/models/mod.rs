//! Domain types shared by the repositories and services.

pub mod follow;
pub mod owner;
pub mod pagination;
pub mod post;
pub mod section;
pub mod tag;
pub mod user;

pub use follow::{FollowEntry, FollowList, Follower};
pub use owner::{
    Image, NewImage, Owner, OwnerBody, OwnerContent, OwnerHeader, OwnerInput, OwnerKind, OwnerRef,
    ProjectFields,
};
pub use pagination::{Page, PageRequest, Window};
pub use post::{Post, PostMirror, PostRow, RankedPost};
pub use section::{NewSection, Section};
pub use tag::{tag_colour, Tag, TagVotes, Vote, VoteRow};
pub use user::{Authority, NewUser, User};
