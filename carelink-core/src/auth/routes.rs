//! Role-based route gating
//!
//! A static table of `(method, pattern, access)` rules evaluated before any
//! handler body runs. Patterns are `/`-separated segments where `*` matches
//! exactly one segment and a trailing `**` matches zero or more.
//!
//! When several rules match, the most specific one wins: more literal
//! segments, then no trailing `**`, then fewer `*`, then a method-bound rule
//! over an any-method one. Remaining ties go to the earlier rule.

use crate::auth::{RoleName, RoleSet, SecurityContext};
use crate::{AuthError, CoreError, Result};
use std::cmp::Reverse;
use tracing::{debug, warn};

/// Who may invoke a route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// No identity needed.
    Public,
    /// Any authenticated principal.
    Authenticated,
    /// A principal holding at least one of these roles.
    Roles(RoleSet),
}

impl Access {
    pub fn roles(roles: &[RoleName]) -> Self {
        Access::Roles(RoleSet::of(roles))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Any,
    Rest,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutePattern {
    raw: String,
    segments: Vec<Segment>,
}

impl RoutePattern {
    pub fn parse(pattern: &str) -> Result<Self> {
        if !pattern.starts_with('/') {
            return Err(CoreError::InvalidRoutePattern(format!(
                "{pattern}: must start with '/'"
            )));
        }

        let parts: Vec<&str> = path_segments(pattern).collect();
        let mut segments = Vec::with_capacity(parts.len());
        for (i, part) in parts.iter().enumerate() {
            let segment = match *part {
                "**" if i + 1 == parts.len() => Segment::Rest,
                "**" => {
                    return Err(CoreError::InvalidRoutePattern(format!(
                        "{pattern}: '**' is only allowed as the last segment"
                    )))
                }
                "*" => Segment::Any,
                literal if literal.contains('*') => {
                    return Err(CoreError::InvalidRoutePattern(format!(
                        "{pattern}: partial wildcards are not supported"
                    )))
                }
                literal => Segment::Literal(literal.to_string()),
            };
            segments.push(segment);
        }

        Ok(RoutePattern {
            raw: pattern.to_string(),
            segments,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn matches(&self, path: &str) -> bool {
        let mut parts = path_segments(path);
        for segment in &self.segments {
            match segment {
                Segment::Rest => return true,
                Segment::Any => {
                    if parts.next().is_none() {
                        return false;
                    }
                }
                Segment::Literal(lit) => {
                    if parts.next() != Some(lit.as_str()) {
                        return false;
                    }
                }
            }
        }
        parts.next().is_none()
    }

    fn specificity(&self) -> (usize, bool, Reverse<usize>) {
        let literals = self
            .segments
            .iter()
            .filter(|s| matches!(s, Segment::Literal(_)))
            .count();
        let bounded = !matches!(self.segments.last(), Some(Segment::Rest));
        let stars = self
            .segments
            .iter()
            .filter(|s| matches!(s, Segment::Any))
            .count();
        (literals, bounded, Reverse(stars))
    }
}

fn path_segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}

#[derive(Debug, Clone)]
pub struct RouteRule {
    method: Option<String>,
    pattern: RoutePattern,
    access: Access,
}

impl RouteRule {
    pub fn pattern(&self) -> &RoutePattern {
        &self.pattern
    }

    pub fn access(&self) -> Access {
        self.access
    }

    fn matches(&self, method: &str, path: &str) -> bool {
        let method_ok = self
            .method
            .as_deref()
            .map_or(true, |m| m.eq_ignore_ascii_case(method));
        method_ok && self.pattern.matches(path)
    }

    fn rank(&self) -> (usize, bool, Reverse<usize>, bool) {
        let (literals, bounded, stars) = self.pattern.specificity();
        (literals, bounded, stars, self.method.is_some())
    }
}

/// Immutable once built; share it behind an `Arc`.
#[derive(Debug, Clone, Default)]
pub struct RoleRouteMatcher {
    rules: Vec<RouteRule>,
}

impl RoleRouteMatcher {
    pub fn new() -> Self {
        RoleRouteMatcher { rules: Vec::new() }
    }

    /// Append a rule. `method` of `None` matches every method.
    pub fn rule(mut self, method: Option<&str>, pattern: &str, access: Access) -> Result<Self> {
        self.rules.push(RouteRule {
            method: method.map(|m| m.to_ascii_uppercase()),
            pattern: RoutePattern::parse(pattern)?,
            access,
        });
        Ok(self)
    }

    /// The clinic API route table.
    pub fn clinic_default() -> Result<Self> {
        use RoleName::{Admin, Doctor, Patient};

        RoleRouteMatcher::new()
            .rule(Some("GET"), "/health", Access::Public)?
            .rule(Some("POST"), "/auth/login", Access::Public)?
            .rule(None, "/patients/register", Access::roles(&[Admin, Doctor]))?
            .rule(None, "/patients/getAllPatient", Access::roles(&[Admin, Doctor]))?
            .rule(None, "/patients/getPatientById/**", Access::roles(&[Admin, Doctor]))?
            .rule(None, "/patients/getMyDetails", Access::roles(&[Patient]))?
            .rule(None, "/patients/edit", Access::roles(&[Admin, Doctor]))?
            .rule(None, "/appointments/scheduleAppointment", Access::roles(&[Doctor]))?
            .rule(None, "/appointments/deleteAppointment/**", Access::roles(&[Doctor]))?
            .rule(None, "/appointments/**", Access::roles(&[Doctor, Patient, Admin]))?
            .rule(None, "/appointments/editAppointment", Access::roles(&[Doctor, Admin]))?
            .rule(None, "/prescription/addPrescription", Access::roles(&[Doctor]))?
            .rule(None, "/prescription/edit", Access::roles(&[Doctor]))?
            .rule(
                None,
                "/prescription/getAllPrescriptions",
                Access::roles(&[Doctor, Admin, Patient]),
            )?
            .rule(None, "/medicalRecord/upload", Access::roles(&[Doctor, Admin]))?
            .rule(None, "/users/**", Access::roles(&[Admin]))?
            .rule(None, "/doctors/getAllDoctor", Access::roles(&[Admin]))?
            .rule(None, "/doctors/create", Access::roles(&[Admin]))?
            .rule(None, "/doctors/me", Access::roles(&[Doctor]))
    }

    pub fn rules(&self) -> &[RouteRule] {
        &self.rules
    }

    /// The most specific rule matching `(method, path)`, if any.
    pub fn lookup(&self, method: &str, path: &str) -> Option<&RouteRule> {
        let mut best: Option<&RouteRule> = None;
        for rule in self.rules.iter().filter(|r| r.matches(method, path)) {
            match best {
                Some(current) if rule.rank() <= current.rank() => {}
                _ => best = Some(rule),
            }
        }
        best
    }

    /// Access level for `(method, path)`; unmatched routes need any
    /// authenticated principal.
    pub fn access_for(&self, method: &str, path: &str) -> Access {
        self.lookup(method, path)
            .map_or(Access::Authenticated, RouteRule::access)
    }

    /// Gate a request. Pure table evaluation with no I/O.
    pub fn authorize(
        &self,
        ctx: &SecurityContext,
        method: &str,
        path: &str,
    ) -> std::result::Result<Access, AuthError> {
        let access = self.access_for(method, path);

        let allowed = match access {
            Access::Public => return Ok(access),
            Access::Authenticated => None,
            Access::Roles(set) => Some(set),
        };

        let Some(principal) = ctx.principal() else {
            warn!(denial = "unauthenticated", method, path, "route requires identity");
            return Err(AuthError::Unauthenticated);
        };

        if let Some(allowed) = allowed {
            if !principal.roles().intersects(&allowed) {
                warn!(
                    denial = "role",
                    subject = principal.subject_id(),
                    method,
                    path,
                    "role set excludes route"
                );
                return Err(AuthError::RoleForbidden);
            }
        }

        debug!(subject = principal.subject_id(), method, path, "route permitted");
        Ok(access)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Principal;

    fn ctx_with(roles: &[RoleName]) -> SecurityContext {
        SecurityContext::for_principal(Principal::new("someone@clinic.test", RoleSet::of(roles)))
    }

    fn table() -> RoleRouteMatcher {
        RoleRouteMatcher::clinic_default().unwrap()
    }

    #[test]
    fn pattern_matching() {
        let exact = RoutePattern::parse("/users/getAllUsers").unwrap();
        assert!(exact.matches("/users/getAllUsers"));
        assert!(exact.matches("/users/getAllUsers/"));
        assert!(!exact.matches("/users/getAllUsers/extra"));
        assert!(!exact.matches("/users"));

        let rest = RoutePattern::parse("/users/**").unwrap();
        assert!(rest.matches("/users"));
        assert!(rest.matches("/users/delete/4"));
        assert!(!rest.matches("/usersx"));

        let one = RoutePattern::parse("/patients/*/notes").unwrap();
        assert!(one.matches("/patients/12/notes"));
        assert!(!one.matches("/patients/notes"));
    }

    #[test]
    fn invalid_patterns_are_rejected() {
        for raw in ["users", "/a/**/b", "/a/b*"] {
            assert!(
                matches!(RoutePattern::parse(raw), Err(CoreError::InvalidRoutePattern(_))),
                "{raw}"
            );
        }
    }

    #[test]
    fn user_listing_gate() {
        let table = table();
        let path = "/users/getAllUsers";

        assert_eq!(
            table.authorize(&SecurityContext::new(), "GET", path),
            Err(AuthError::Unauthenticated)
        );
        assert_eq!(
            table.authorize(&ctx_with(&[RoleName::Patient]), "GET", path),
            Err(AuthError::RoleForbidden)
        );
        assert!(table.authorize(&ctx_with(&[RoleName::Admin]), "GET", path).is_ok());
    }

    #[test]
    fn specific_rule_beats_wildcard_regardless_of_order() {
        let table = table();
        let edit = table.lookup("PUT", "/appointments/editAppointment").unwrap();
        assert_eq!(edit.pattern().as_str(), "/appointments/editAppointment");

        assert_eq!(
            table.authorize(&ctx_with(&[RoleName::Patient]), "PUT", "/appointments/editAppointment"),
            Err(AuthError::RoleForbidden)
        );
        assert!(table
            .authorize(&ctx_with(&[RoleName::Patient]), "GET", "/appointments/getAllAppointments")
            .is_ok());
    }

    #[test]
    fn delete_appointment_is_doctor_only() {
        let table = table();
        let path = "/appointments/deleteAppointment/3";
        assert!(table.authorize(&ctx_with(&[RoleName::Doctor]), "DELETE", path).is_ok());
        assert_eq!(
            table.authorize(&ctx_with(&[RoleName::Admin]), "DELETE", path),
            Err(AuthError::RoleForbidden)
        );
    }

    #[test]
    fn unmatched_routes_need_authentication_only() {
        let table = table();
        assert_eq!(table.access_for("GET", "/medicalRecord/getAllRecord"), Access::Authenticated);
        assert_eq!(
            table.authorize(&SecurityContext::new(), "GET", "/medicalRecord/getAllRecord"),
            Err(AuthError::Unauthenticated)
        );
        assert!(table
            .authorize(&ctx_with(&[RoleName::Patient]), "GET", "/nowhere/at/all")
            .is_ok());
    }

    #[test]
    fn public_routes_are_method_bound() {
        let table = table();
        assert_eq!(
            table.authorize(&SecurityContext::new(), "POST", "/auth/login"),
            Ok(Access::Public)
        );
        assert_eq!(
            table.authorize(&SecurityContext::new(), "GET", "/auth/login"),
            Err(AuthError::Unauthenticated)
        );
    }

    #[test]
    fn method_bound_rule_wins_over_any_method() {
        let table = RoleRouteMatcher::new()
            .rule(None, "/reports/daily", Access::roles(&[RoleName::Admin]))
            .unwrap()
            .rule(Some("get"), "/reports/daily", Access::Authenticated)
            .unwrap();

        assert_eq!(table.access_for("GET", "/reports/daily"), Access::Authenticated);
        assert_eq!(
            table.access_for("POST", "/reports/daily"),
            Access::roles(&[RoleName::Admin])
        );
    }

    #[test]
    fn ties_go_to_the_earlier_rule() {
        let table = RoleRouteMatcher::new()
            .rule(None, "/a/*", Access::roles(&[RoleName::Doctor]))
            .unwrap()
            .rule(None, "/*/b", Access::roles(&[RoleName::Patient]))
            .unwrap();
        assert_eq!(table.access_for("GET", "/a/b"), Access::roles(&[RoleName::Doctor]));
    }

    #[test]
    fn clinic_table_grants_exactly_the_listed_roles() {
        use RoleName::{Admin, Doctor, Patient};
        const ALL: &[RoleName] = &[Admin, Doctor, Patient];

        let public = [("GET", "/health"), ("POST", "/auth/login")];
        let rows: &[(&str, &str, &[RoleName])] = &[
            ("POST", "/patients/register", &[Admin, Doctor]),
            ("GET", "/patients/getAllPatient", &[Admin, Doctor]),
            ("GET", "/patients/getPatientById/7", &[Admin, Doctor]),
            ("GET", "/patients/getMyDetails", &[Patient]),
            ("PUT", "/patients/edit", &[Admin, Doctor]),
            ("POST", "/appointments/scheduleAppointment", &[Doctor]),
            ("GET", "/appointments/getAllAppointments", ALL),
            ("PUT", "/appointments/editAppointment", &[Admin, Doctor]),
            ("DELETE", "/appointments/deleteAppointment/3", &[Doctor]),
            ("POST", "/prescription/addPrescription", &[Doctor]),
            ("PUT", "/prescription/edit", &[Doctor]),
            ("GET", "/prescription/getAllPrescriptions", ALL),
            ("POST", "/medicalRecord/upload", &[Admin, Doctor]),
            ("GET", "/medicalRecord/getAllRecord", ALL),
            ("GET", "/medicalRecord/getMedicalRecordFileById/2", ALL),
            ("GET", "/users/getAllUsers", &[Admin]),
            ("GET", "/users/getUser/1", &[Admin]),
            ("POST", "/users/create", &[Admin]),
            ("DELETE", "/users/delete/1", &[Admin]),
            ("GET", "/doctors/getAllDoctor", &[Admin]),
            ("POST", "/doctors/create", &[Admin]),
            ("GET", "/doctors/me", &[Doctor]),
        ];

        let table = table();
        for rule in table.rules() {
            let exercised = public
                .iter()
                .copied()
                .chain(rows.iter().map(|(method, path, _)| (*method, *path)))
                .any(|(method, path)| {
                    table.lookup(method, path).map(|r| r.pattern().as_str())
                        == Some(rule.pattern().as_str())
                });
            assert!(exercised, "no row exercises {}", rule.pattern().as_str());
        }

        for (method, path) in public {
            assert_eq!(
                table.authorize(&SecurityContext::new(), method, path),
                Ok(Access::Public),
                "{method} {path}"
            );
        }

        for (method, path, allowed) in rows {
            assert_eq!(
                table.authorize(&SecurityContext::new(), method, path),
                Err(AuthError::Unauthenticated),
                "{method} {path}"
            );

            for role in ALL {
                let outcome = table.authorize(&ctx_with(&[*role]), method, path);
                if allowed.contains(role) {
                    assert!(outcome.is_ok(), "{role:?} should reach {method} {path}");
                } else {
                    assert_eq!(
                        outcome,
                        Err(AuthError::RoleForbidden),
                        "{role:?} should be refused {method} {path}"
                    );
                }
            }
        }
    }
}
