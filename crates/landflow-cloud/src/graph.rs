//! Dependency graph and topological plan

use crate::error::{CloudError, Result};
use crate::resource::ResourceSpec;
use std::collections::{BTreeSet, HashMap};

/// Specs in dependency order
///
/// Every spec appears after all of its dependencies. Independent branches keep
/// their declaration order, so the same input always yields the same plan.
#[derive(Debug, Clone)]
pub struct ProvisioningPlan {
    specs: Vec<ResourceSpec>,
    index: HashMap<String, usize>,
    /// dependencies[i] = indices (into `specs`) of the specs i depends on
    dependencies: Vec<Vec<usize>>,
    /// dependents[i] = indices of the specs that depend on i
    dependents: Vec<Vec<usize>>,
}

impl ProvisioningPlan {
    /// Validate the graph and sort it with Kahn's algorithm
    pub fn build(declared: Vec<ResourceSpec>) -> Result<Self> {
        let mut position = HashMap::with_capacity(declared.len());
        for (i, spec) in declared.iter().enumerate() {
            if position.insert(spec.name.clone(), i).is_some() {
                return Err(CloudError::DuplicateResource(spec.name.clone()));
            }
        }

        let mut in_degree = vec![0usize; declared.len()];
        let mut outgoing: Vec<Vec<usize>> = vec![Vec::new(); declared.len()];
        for (i, spec) in declared.iter().enumerate() {
            let mut seen = BTreeSet::new();
            for dep in &spec.depends_on {
                let &d = position
                    .get(dep)
                    .ok_or_else(|| CloudError::UnknownDependency {
                        resource: spec.name.clone(),
                        dependency: dep.clone(),
                    })?;
                if seen.insert(d) {
                    in_degree[i] += 1;
                    outgoing[d].push(i);
                }
            }
        }

        // lowest declaration index first
        let mut ready: BTreeSet<usize> = (0..declared.len())
            .filter(|&i| in_degree[i] == 0)
            .collect();
        let mut order = Vec::with_capacity(declared.len());
        while let Some(i) = ready.pop_first() {
            order.push(i);
            for &next in &outgoing[i] {
                in_degree[next] -= 1;
                if in_degree[next] == 0 {
                    ready.insert(next);
                }
            }
        }

        if order.len() != declared.len() {
            let cyclic = (0..declared.len())
                .filter(|&i| in_degree[i] > 0)
                .map(|i| declared[i].name.clone())
                .collect();
            return Err(CloudError::CyclicDependency(cyclic));
        }

        let mut slots: Vec<Option<ResourceSpec>> = declared.into_iter().map(Some).collect();
        let specs: Vec<ResourceSpec> = order.iter().filter_map(|&i| slots[i].take()).collect();
        let index: HashMap<String, usize> = specs
            .iter()
            .enumerate()
            .map(|(i, spec)| (spec.name.clone(), i))
            .collect();

        let mut dependencies = vec![Vec::new(); specs.len()];
        let mut dependents = vec![Vec::new(); specs.len()];
        for (i, spec) in specs.iter().enumerate() {
            for dep in &spec.depends_on {
                let d = index[dep.as_str()];
                if !dependencies[i].contains(&d) {
                    dependencies[i].push(d);
                    dependents[d].push(i);
                }
            }
        }

        Ok(Self {
            specs,
            index,
            dependencies,
            dependents,
        })
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    /// Specs in provisioning order
    pub fn forward_order(&self) -> impl DoubleEndedIterator<Item = &ResourceSpec> {
        self.specs.iter()
    }

    /// Specs in teardown order: the exact reverse of [`Self::forward_order`]
    pub fn teardown_order(&self) -> impl Iterator<Item = &ResourceSpec> {
        self.specs.iter().rev()
    }

    pub fn get(&self, name: &str) -> Option<&ResourceSpec> {
        self.position(name).map(|i| &self.specs[i])
    }

    /// Position of `name` in the forward order
    pub fn position(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub fn spec_at(&self, position: usize) -> &ResourceSpec {
        &self.specs[position]
    }

    /// Positions of the direct dependencies of the spec at `position`
    pub fn dependencies_at(&self, position: usize) -> &[usize] {
        &self.dependencies[position]
    }

    /// Positions of the direct dependents of the spec at `position`
    pub fn dependents_at(&self, position: usize) -> &[usize] {
        &self.dependents[position]
    }

    /// Names of the specs that directly depend on `name`
    pub fn dependents_of(&self, name: &str) -> Vec<&str> {
        self.position(name)
            .map(|i| {
                self.dependents[i]
                    .iter()
                    .map(|&d| self.specs[d].name.as_str())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Names of every spec that transitively depends on `name`, in plan order
    pub fn descendants_of(&self, name: &str) -> Vec<&str> {
        let Some(root) = self.position(name) else {
            return Vec::new();
        };
        self.descendants_at(root)
            .into_iter()
            .map(|i| self.specs[i].name.as_str())
            .collect()
    }

    /// Positions of every transitive dependent of `root`, ascending
    pub fn descendants_at(&self, root: usize) -> BTreeSet<usize> {
        let mut found = BTreeSet::new();
        let mut stack = vec![root];
        while let Some(i) = stack.pop() {
            for &d in &self.dependents[i] {
                if found.insert(d) {
                    stack.push(d);
                }
            }
        }
        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::ResourceKind;

    fn spec(name: &str, deps: &[&str]) -> ResourceSpec {
        deps.iter().fold(
            ResourceSpec::new(name, ResourceKind::Bucket),
            |spec, dep| spec.depends_on(*dep),
        )
    }

    fn names(plan: &ProvisioningPlan) -> Vec<&str> {
        plan.forward_order().map(|s| s.name.as_str()).collect()
    }

    #[test]
    fn test_dependencies_come_first() {
        let plan = ProvisioningPlan::build(vec![
            spec("user", &["endpoint", "role", "bucket"]),
            spec("endpoint", &["role"]),
            spec("role", &["policy"]),
            spec("policy", &["bucket"]),
            spec("bucket", &[]),
        ])
        .unwrap();

        assert_eq!(names(&plan), vec!["bucket", "policy", "role", "endpoint", "user"]);
    }

    #[test]
    fn test_ties_follow_declaration_order() {
        let plan = ProvisioningPlan::build(vec![
            spec("bucket", &[]),
            spec("network-rule", &[]),
            spec("transfer-policy", &["bucket"]),
            spec("warehouse-policy", &["bucket"]),
        ])
        .unwrap();

        assert_eq!(
            names(&plan),
            vec!["bucket", "network-rule", "transfer-policy", "warehouse-policy"]
        );
    }

    #[test]
    fn test_teardown_is_exact_reverse() {
        let plan = ProvisioningPlan::build(vec![
            spec("a", &[]),
            spec("b", &["a"]),
            spec("c", &["a"]),
            spec("d", &["b", "c"]),
        ])
        .unwrap();

        let mut forward = names(&plan);
        forward.reverse();
        let teardown: Vec<&str> = plan.teardown_order().map(|s| s.name.as_str()).collect();
        assert_eq!(forward, teardown);
    }

    #[test]
    fn test_cycle_is_rejected_with_members() {
        let err = ProvisioningPlan::build(vec![
            spec("bucket", &[]),
            spec("a", &["c"]),
            spec("b", &["a"]),
            spec("c", &["b"]),
        ])
        .unwrap_err();

        match err {
            CloudError::CyclicDependency(members) => {
                assert_eq!(members, vec!["a", "b", "c"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_unknown_dependency() {
        let err = ProvisioningPlan::build(vec![spec("role", &["policy"])]).unwrap_err();
        assert!(matches!(
            err,
            CloudError::UnknownDependency { ref resource, ref dependency }
                if resource == "role" && dependency == "policy"
        ));
    }

    #[test]
    fn test_duplicate_resource() {
        let err =
            ProvisioningPlan::build(vec![spec("bucket", &[]), spec("bucket", &[])]).unwrap_err();
        assert!(matches!(err, CloudError::DuplicateResource(name) if name == "bucket"));
    }

    #[test]
    fn test_repeated_dependency_counts_once() {
        let plan =
            ProvisioningPlan::build(vec![spec("a", &[]), spec("b", &["a", "a"])]).unwrap();
        assert_eq!(plan.dependents_of("a"), vec!["b"]);
        assert_eq!(plan.dependencies_at(1), &[0]);
    }

    #[test]
    fn test_descendants() {
        let plan = ProvisioningPlan::build(vec![
            spec("bucket", &[]),
            spec("policy", &["bucket"]),
            spec("role", &["policy"]),
            spec("network", &[]),
            spec("cluster", &["role", "network"]),
        ])
        .unwrap();

        assert_eq!(plan.descendants_of("policy"), vec!["role", "cluster"]);
        assert_eq!(plan.descendants_of("network"), vec!["cluster"]);
        assert!(plan.descendants_of("cluster").is_empty());
        assert!(plan.descendants_of("missing").is_empty());
    }
}
